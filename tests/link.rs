//! End-to-end link runs over the module samples in `tests/samples`.
//!
//! `App` is an executable referencing the `Utils` library. Its entry point reaches a helper in
//! `Utils`, a `Ping`/`Pong` cycle, a virtual call on an abstract `Shape` and a type token for
//! `Circle`, plus a tracing call guarded by the `Features.IsTracing` switch.

use std::{fs, path::PathBuf};

use dotlink::{
    driver::CustomStep,
    linker::{codes, AssemblyAction, CodeOptimizations, RootVisibility},
    Driver, DriverOptions, LinkContext, Result, SymbolRef,
};
use tempfile::TempDir;

fn sample(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/samples")
        .join(name)
}

/// Options linking `App` with `Utils` found through the samples directory.
fn app_options(output: &TempDir) -> DriverOptions {
    DriverOptions {
        assemblies: vec![(sample("App.json"), RootVisibility::Any)],
        search_directories: vec![sample("")],
        output_directory: output.path().to_path_buf(),
        ..DriverOptions::default()
    }
}

/// Returns true if the symbol exists and survived the sweep.
fn kept(ctx: &LinkContext, assembly: &str, name: &str) -> bool {
    ctx.graph
        .find(&SymbolRef::new(assembly, name))
        .is_some_and(|id| !ctx.graph.symbol(id).is_removed())
}

/// Test that everything reachable from the entry point survives and the rest is removed.
#[test]
fn test_closure_from_entry_point() -> Result<()> {
    let output = TempDir::new()?;
    let ctx = Driver::new(app_options(&output)).run()?;

    assert!(kept(&ctx, "App", "App.Program::Main"));
    assert!(kept(&ctx, "Utils", "Utils.Helper"));
    assert!(kept(&ctx, "Utils", "Utils.Helper::Run"));
    assert!(kept(&ctx, "App", "App.Shape::Draw"));
    assert!(kept(&ctx, "App", "App.Circle"));

    assert!(!kept(&ctx, "App", "App.Program::Unused"));
    assert!(!kept(&ctx, "App", "App.Orphan"));
    assert!(!kept(&ctx, "Utils", "Utils.Helper::Stop"));
    assert!(!kept(&ctx, "Utils", "Utils.Unused"));
    assert!(!kept(&ctx, "Utils", "Utils.Internal"));

    assert!(output.path().join("App.json").is_file());
    assert!(output.path().join("Utils.json").is_file());
    assert!(!ctx.diagnostics.has_errors());
    Ok(())
}

/// Test that the written module no longer contains swept types.
#[test]
fn test_output_omits_removed_symbols() -> Result<()> {
    let output = TempDir::new()?;
    Driver::new(app_options(&output)).run()?;

    let written = fs::read_to_string(output.path().join("App.json"))?;
    assert!(written.contains("App.Program"));
    assert!(!written.contains("App.Orphan"));
    assert!(!written.contains("\"Unused\""));
    Ok(())
}

/// Test that a call cycle terminates with each method marked exactly once.
#[test]
fn test_cycle_is_marked_once() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        dump_dependencies: true,
        ..app_options(&output)
    };
    let ctx = Driver::new(options).run()?;

    for name in ["App.Program::Ping", "App.Program::Pong"] {
        let id = ctx
            .graph
            .find(&SymbolRef::new("App", name))
            .expect("cycle method exists");
        assert!(ctx.annotations.is_marked(id));
        let edges = ctx.tracer.edges().iter().filter(|e| e.target == id).count();
        assert_eq!(edges, 1, "{name} reached more than once");
    }
    assert!(output
        .path()
        .join(dotlink::linker::tracer::DEFAULT_DEPENDENCIES_FILE)
        .is_file());
    Ok(())
}

/// Test that a skipped assembly contributes no symbols and is not written.
#[test]
fn test_skip_assembly_is_not_marked() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        assembly_actions: vec![(AssemblyAction::Skip, "Utils".to_string())],
        ..app_options(&output)
    };
    let ctx = Driver::new(options).run()?;

    let helper = ctx
        .graph
        .find(&SymbolRef::new("Utils", "Utils.Helper"))
        .expect("Utils is loaded");
    assert!(!ctx.annotations.is_marked(helper));
    assert!(!output.path().join("Utils.json").exists());
    assert!(output.path().join("App.json").is_file());
    Ok(())
}

/// Test that an override in a type that is never instantiated is removed by default.
#[test]
fn test_override_removed_without_instantiation() -> Result<()> {
    let output = TempDir::new()?;
    let ctx = Driver::new(app_options(&output)).run()?;

    assert!(kept(&ctx, "App", "App.Circle"));
    assert!(!kept(&ctx, "App", "App.Circle::Draw"));
    Ok(())
}

/// Test that disabling override removal keeps the override of a marked virtual method.
#[test]
fn test_disabled_override_removal_keeps_override() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        optimizations: vec![(CodeOptimizations::OVERRIDE_REMOVAL, None, false)],
        ..app_options(&output)
    };
    let ctx = Driver::new(options).run()?;

    assert!(kept(&ctx, "App", "App.Circle::Draw"));
    Ok(())
}

/// Test that descriptor entries root symbols nothing else references.
#[test]
fn test_descriptor_roots() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        descriptors: vec![sample("descriptors.xml")],
        ..app_options(&output)
    };
    let ctx = Driver::new(options).run()?;

    assert!(kept(&ctx, "Utils", "Utils.Unused"));
    assert!(kept(&ctx, "Utils", "Utils.Unused::Run"));
    assert!(kept(&ctx, "App", "App.Orphan::Run"));
    assert!(!kept(&ctx, "Utils", "Utils.Internal"));
    Ok(())
}

/// Test that a stubbed feature switch folds the branch it guards before marking.
#[test]
fn test_substituted_feature_switch() -> Result<()> {
    let output = TempDir::new()?;
    let ctx = Driver::new(app_options(&output)).run()?;
    assert!(kept(&ctx, "App", "App.Diagnostics::Trace"));

    let output = TempDir::new()?;
    let options = DriverOptions {
        substitutions: vec![sample("substitutions.xml")],
        ..app_options(&output)
    };
    let ctx = Driver::new(options).run()?;
    assert!(!kept(&ctx, "App", "App.Diagnostics"));
    Ok(())
}

/// Test that an explicit copy action keeps the whole assembly unchanged.
#[test]
fn test_copy_action_writes_input_unchanged() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        assembly_actions: vec![(AssemblyAction::Copy, "Utils".to_string())],
        ..app_options(&output)
    };
    let ctx = Driver::new(options).run()?;

    assert!(kept(&ctx, "Utils", "Utils.Internal"));
    let written = fs::read(output.path().join("Utils.json"))?;
    assert_eq!(written, fs::read(sample("Utils.json"))?);
    Ok(())
}

/// Test that a library root with the default visibility is copied whole.
#[test]
fn test_library_root_is_copied() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        assemblies: vec![(sample("Utils.json"), RootVisibility::Any)],
        output_directory: output.path().to_path_buf(),
        ..DriverOptions::default()
    };
    let ctx = Driver::new(options).run()?;

    assert_eq!(ctx.actions.get("Utils"), AssemblyAction::Copy);
    assert!(kept(&ctx, "Utils", "Utils.Internal"));
    Ok(())
}

/// Test that a library rooted by public surface is linked down to it.
#[test]
fn test_library_public_surface() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        assemblies: vec![(sample("Utils.json"), RootVisibility::PublicAndFamily)],
        output_directory: output.path().to_path_buf(),
        ..DriverOptions::default()
    };
    let ctx = Driver::new(options).run()?;

    assert_eq!(ctx.actions.get("Utils"), AssemblyAction::Link);
    assert!(kept(&ctx, "Utils", "Utils.Helper::Stop"));
    assert!(!kept(&ctx, "Utils", "Utils.Internal"));
    Ok(())
}

/// Test that deterministic runs write identical modules.
#[test]
fn test_deterministic_output() -> Result<()> {
    let mut written = Vec::new();
    for _ in 0..2 {
        let output = TempDir::new()?;
        let options = DriverOptions {
            deterministic: Some(true),
            ..app_options(&output)
        };
        Driver::new(options).run()?;
        written.push(fs::read(output.path().join("App.json"))?);
    }
    assert_eq!(written[0], written[1]);
    Ok(())
}

/// Test that a missing reference only warns by default and fails when unresolved
/// references are not skipped.
#[test]
fn test_unresolved_reference_policy() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        assemblies: vec![(sample("Broken.json"), RootVisibility::Any)],
        output_directory: output.path().to_path_buf(),
        ..DriverOptions::default()
    };
    let ctx = Driver::new(options.clone()).run()?;
    assert!(!ctx.diagnostics.with_code(codes::UNRESOLVED_ASSEMBLY).is_empty());
    assert!(!ctx.diagnostics.has_errors());

    let strict = DriverOptions {
        skip_unresolved: Some(false),
        ..options
    };
    assert!(Driver::new(strict).run().is_err());
    Ok(())
}

/// Test that a missing input assembly is an error.
#[test]
fn test_missing_root_assembly() {
    let output = TempDir::new().unwrap();
    let options = DriverOptions {
        assemblies: vec![(sample("Nowhere.json"), RootVisibility::Any)],
        output_directory: output.path().to_path_buf(),
        ..DriverOptions::default()
    };
    assert!(Driver::new(options).run().is_err());
}

/// Test that custom steps are placed relative to named steps.
#[test]
fn test_custom_step_placement() -> Result<()> {
    let output = TempDir::new()?;
    let options = DriverOptions {
        custom_steps: vec!["-OutputStep:SealerStep".parse::<CustomStep>()?],
        ..app_options(&output)
    };
    let driver = Driver::new(options);
    let ctx = driver.create_context();
    let pipeline = driver.create_pipeline(&ctx)?;

    let names = pipeline.step_names();
    let output_at = names
        .iter()
        .position(|n| *n == "OutputStep")
        .expect("output step present");
    assert!(names[..output_at].iter().any(|n| n.starts_with("SealerStep")));
    Ok(())
}
