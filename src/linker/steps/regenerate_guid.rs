use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use sha1::{Digest, Sha1};
use uguid::Guid;

use crate::{
    linker::{actions::AssemblyAction, LinkContext, Step},
    Result,
};

/// Gives every rewritten module a fresh MVID.
///
/// Modules that are copied or skipped keep theirs, since their bytes do not change. The new
/// identifiers are random per run; deterministic builds leave this step out and let
/// [`OutputStep`](super::OutputStep) derive the MVID from the written content instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegenerateGuidStep;

impl Step for RegenerateGuidStep {
    fn name(&self) -> &'static str {
        "RegenerateGuidStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();

        for (index, module) in ctx.graph.modules().to_vec().into_iter().enumerate() {
            if ctx.graph.symbol(module).is_removed() || !is_rewritten(ctx.action_of(module)) {
                continue;
            }

            let mut hasher = Sha1::new();
            hasher.update(ctx.graph.assembly_of(module).as_bytes());
            hasher.update(seed.to_le_bytes());
            hasher.update(index.to_le_bytes());
            let mvid = guid_from_digest(&hasher.finalize());

            debug!("New mvid {mvid} for '{}'", ctx.graph.assembly_of(module));
            ctx.graph.set_mvid(module, mvid);
        }
        Ok(())
    }
}

fn is_rewritten(action: AssemblyAction) -> bool {
    matches!(
        action,
        AssemblyAction::Link | AssemblyAction::Save | AssemblyAction::AddBypassNGen
    )
}

/// Builds a version 4 style GUID from the leading bytes of a SHA-1 digest.
pub(crate) fn guid_from_digest(digest: &[u8]) -> Guid {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[7] = (bytes[7] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Guid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestLink;

    #[test]
    fn only_written_modules_change() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let lib = link.module("Lib", AssemblyAction::Save);
        let core = link.module("System.Private.CoreLib", AssemblyAction::Copy);

        link.run(&mut RegenerateGuidStep).unwrap();

        let mvid = |id| link.ctx.graph.module_info(id).mvid;
        assert_ne!(mvid(app), Guid::ZERO);
        assert_ne!(mvid(lib), Guid::ZERO);
        assert_ne!(mvid(app), mvid(lib));
        assert_eq!(mvid(core), Guid::ZERO);
    }

    #[test]
    fn digest_guids_are_stable() {
        let digest = Sha1::digest(b"App");
        assert_eq!(guid_from_digest(&digest), guid_from_digest(&digest));
        assert_ne!(guid_from_digest(&digest), Guid::ZERO);
    }
}
