use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgAction, ArgMatches, Parser};
use dotlink::{
    driver::CustomStep,
    linker::{AssemblyAction, CodeOptimizations, RootVisibility},
    DriverOptions,
};

/// dotlink - mark-and-sweep IL linker for .NET module graphs
///
/// Arguments starting with '@' are read from a response file.
#[derive(Debug, Parser)]
#[command(name = "dotlink", version, about, long_about = None)]
pub struct Cli {
    /// Link the assembly and root its whole API (or its entry point).
    #[arg(short = 'a', value_name = "FILE", action = ArgAction::Append)]
    pub assemblies: Vec<PathBuf>,

    /// Link the assembly and root its public and family API.
    #[arg(short = 'r', value_name = "FILE", action = ArgAction::Append)]
    pub public_assemblies: Vec<PathBuf>,

    /// Root the types and members listed in an XML descriptor.
    #[arg(short = 'x', value_name = "FILE", action = ArgAction::Append)]
    pub descriptors: Vec<PathBuf>,

    /// Directory searched for referenced assemblies.
    #[arg(short = 'd', value_name = "DIR", action = ArgAction::Append)]
    pub search_directories: Vec<PathBuf>,

    /// Reference-only assembly file.
    #[arg(long = "reference", value_name = "FILE", action = ArgAction::Append)]
    pub references: Vec<PathBuf>,

    /// Output directory.
    #[arg(short = 'o', long = "out", value_name = "DIR", default_value = "output")]
    pub output: PathBuf,

    /// Action for framework assemblies: skip, copy, copyused, link, addbypassngen, addbypassngenused, save.
    #[arg(short = 'c', value_name = "ACTION")]
    pub core_action: Option<String>,

    /// Action for all other assemblies.
    #[arg(short = 'u', value_name = "ACTION")]
    pub user_action: Option<String>,

    /// Action for one assembly; later occurrences win.
    #[arg(short = 'p', num_args = 2, value_names = ["ACTION", "ASSEMBLY"], action = ArgAction::Append)]
    pub assembly_actions: Vec<String>,

    /// Enable an optimization, globally or for one assembly.
    #[arg(long = "enable-opt", num_args = 1..=2, value_names = ["NAME", "ASSEMBLY"], action = ArgAction::Append)]
    pub enable_opt: Vec<String>,

    /// Disable an optimization, globally or for one assembly.
    #[arg(long = "disable-opt", num_args = 1..=2, value_names = ["NAME", "ASSEMBLY"], action = ArgAction::Append)]
    pub disable_opt: Vec<String>,

    /// Set a feature switch.
    #[arg(long = "feature", num_args = 2, value_names = ["NAME", "VALUE"], action = ArgAction::Append)]
    pub features: Vec<String>,

    /// Data for custom steps.
    #[arg(long = "custom-data", value_name = "KEY=VALUE", action = ArgAction::Append)]
    pub custom_data: Vec<String>,

    /// Add a step: TYPE[,PROVIDER] or (+|-)STEP:TYPE[,PROVIDER].
    #[arg(long = "custom-step", value_name = "CFG", action = ArgAction::Append)]
    pub custom_steps: Vec<String>,

    /// Method body and field substitutions.
    #[arg(long = "substitutions", value_name = "FILE", action = ArgAction::Append)]
    pub substitutions: Vec<PathBuf>,

    /// Custom attribute definitions.
    #[arg(long = "attribute-defs", value_name = "FILE", action = ArgAction::Append)]
    pub attribute_definitions: Vec<PathBuf>,

    /// Features whose code is removed, comma separated.
    #[arg(long = "exclude-feature", value_name = "LIST", value_delimiter = ',', action = ArgAction::Append)]
    pub excluded_features: Vec<String>,

    /// Do not fail on unresolved references.
    #[arg(long = "skip-unresolved", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub skip_unresolved: Option<bool>,

    /// Ignore descriptors embedded in assemblies.
    #[arg(long = "ignore-descriptors", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub ignore_descriptors: Option<bool>,

    /// Remove security declarations and attributes.
    #[arg(long = "strip-security", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub strip_security: Option<bool>,

    /// Remove embedded linker descriptors.
    #[arg(long = "strip-resources", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub strip_resources: Option<bool>,

    /// Keep dependency-tracking attributes.
    #[arg(long = "keep-dep-attributes", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub keep_dependency_attributes: Option<bool>,

    /// Keep only attributes whose type is used elsewhere.
    #[arg(long = "used-attrs-only", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub used_attributes_only: Option<bool>,

    /// Produce deterministic output.
    #[arg(long = "deterministic", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub deterministic: Option<bool>,

    /// Give every linked assembly a new MVID.
    #[arg(long = "new-mvid", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub new_mvid: Option<bool>,

    /// Record why each symbol was kept.
    #[arg(long = "dump-dependencies")]
    pub dump_dependencies: bool,

    /// Dependency dump file; a `.gz` extension compresses it.
    #[arg(long = "dependencies-file", value_name = "PATH")]
    pub dependencies_file: Option<PathBuf>,

    /// Treat warnings as errors, optionally only the listed codes.
    #[arg(long = "warnaserror", value_name = "CODES", num_args = 0..=1, default_missing_value = "")]
    pub warn_as_error: Option<String>,

    /// Suppress the listed warning codes.
    #[arg(long = "nowarn", value_name = "CODES", action = ArgAction::Append)]
    pub no_warn: Vec<String>,

    /// Enable verbose (debug-level) output.
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// Converts the parsed arguments into driver options.
    ///
    /// `matches` are the matches `self` was built from; they provide the grouping of
    /// multi-value options and the relative order of `-a`/`-r` and of
    /// `--enable-opt`/`--disable-opt`.
    pub fn driver_options(&self, matches: &ArgMatches) -> anyhow::Result<DriverOptions> {
        let mut options = DriverOptions {
            search_directories: self.search_directories.clone(),
            references: self.references.clone(),
            output_directory: self.output.clone(),
            descriptors: self.descriptors.clone(),
            substitutions: self.substitutions.clone(),
            attribute_definitions: self.attribute_definitions.clone(),
            excluded_features: self
                .excluded_features
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            skip_unresolved: self.skip_unresolved,
            deterministic: self.deterministic,
            new_mvid: self.new_mvid,
            dump_dependencies: self.dump_dependencies,
            dependencies_file: self.dependencies_file.clone(),
            verbose: self.verbose,
            ..DriverOptions::default()
        };

        let mut assemblies: Vec<(usize, PathBuf, RootVisibility)> = Vec::new();
        for (id, files, visibility) in [
            ("assemblies", &self.assemblies, RootVisibility::Any),
            ("public_assemblies", &self.public_assemblies, RootVisibility::PublicAndFamily),
        ] {
            for (index, group) in occurrences(matches, id, files) {
                assemblies.extend(group.iter().map(|file| (index, file.clone(), visibility)));
            }
        }
        assemblies.sort_by_key(|(index, ..)| *index);
        options.assemblies = assemblies
            .into_iter()
            .map(|(_, file, visibility)| (file, visibility))
            .collect();

        if let Some(action) = &self.core_action {
            options.core_action = parse_action(action)?;
        }
        if let Some(action) = &self.user_action {
            options.user_action = parse_action(action)?;
        }
        for pair in self.assembly_actions.chunks(2) {
            let [action, assembly] = pair else {
                bail!("Option '-p' expects an action and an assembly name");
            };
            options
                .assembly_actions
                .push((parse_action(action)?, assembly.clone()));
        }

        let mut switches: Vec<(usize, &[String], bool)> =
            occurrences(matches, "enable_opt", &self.enable_opt)
                .into_iter()
                .map(|(index, values)| (index, values, true))
                .chain(
                    occurrences(matches, "disable_opt", &self.disable_opt)
                        .into_iter()
                        .map(|(index, values)| (index, values, false)),
                )
                .collect();
        // Later switches override earlier ones
        switches.sort_by_key(|(index, ..)| *index);
        for (_, values, enabled) in switches {
            let (name, assembly) = match values {
                [name] => (name, None),
                [name, assembly] => (name, Some(assembly.clone())),
                _ => bail!("Optimization options expect a name and an optional assembly"),
            };
            let opt = CodeOptimizations::from_option_name(name)
                .with_context(|| format!("Invalid optimization '{name}'"))?;
            options.optimizations.push((opt, assembly, enabled));
        }

        for pair in self.features.chunks(2) {
            let [name, value] = pair else {
                bail!("Option '--feature' expects a name and a value");
            };
            let enabled = value
                .parse::<bool>()
                .with_context(|| format!("Invalid value '{value}' for feature '{name}'"))?;
            options.features.push((name.clone(), enabled));
        }

        for entry in &self.custom_data {
            let Some((key, value)) = entry.split_once('=') else {
                bail!("Value used with '--custom-data' has to be in the KEY=VALUE format");
            };
            options.custom_data.push((key.to_string(), value.to_string()));
        }

        for step in &self.custom_steps {
            options.custom_steps.push(
                step.parse::<CustomStep>()
                    .with_context(|| format!("Invalid '--custom-step' value '{step}'"))?,
            );
        }

        if let Some(value) = self.ignore_descriptors {
            options.ignore_descriptors = value;
        }
        if let Some(value) = self.strip_security {
            options.strip_security = value;
        }
        if let Some(value) = self.strip_resources {
            options.strip_resources = value;
        }
        if let Some(value) = self.keep_dependency_attributes {
            options.keep_dependency_attributes = value;
        }
        if let Some(value) = self.used_attributes_only {
            options.used_attributes_only = value;
        }

        if let Some(codes) = &self.warn_as_error {
            let codes = parse_warning_codes(codes)?;
            if codes.is_empty() {
                options.warn_as_error = true;
            } else {
                options.warn_as_error_codes = codes;
            }
        }
        for codes in &self.no_warn {
            options.no_warn.extend(parse_warning_codes(codes)?);
        }

        Ok(options)
    }
}

/// Splits the parsed `values` of argument `id` into its occurrences, each paired with the
/// command-line index of its first value.
fn occurrences<'a, T>(matches: &ArgMatches, id: &str, values: &'a [T]) -> Vec<(usize, &'a [T])> {
    let Some(groups) = matches.get_raw_occurrences(id) else {
        return Vec::new();
    };
    let indices: Vec<usize> = matches.indices_of(id).into_iter().flatten().collect();

    let mut result = Vec::new();
    let mut start = 0;
    for group in groups {
        let end = (start + group.count()).min(values.len());
        if let Some(index) = indices.get(start) {
            result.push((*index, &values[start..end]));
        }
        start = end;
    }
    result
}

fn parse_action(value: &str) -> anyhow::Result<AssemblyAction> {
    value
        .parse::<AssemblyAction>()
        .with_context(|| format!("Unknown assembly action '{value}'"))
}

/// Parses `IL2026,2027;IL2028` style code lists.
fn parse_warning_codes(value: &str) -> anyhow::Result<Vec<u32>> {
    value
        .split([',', ';', ' '])
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            let digits = code
                .strip_prefix("IL")
                .or_else(|| code.strip_prefix("il"))
                .unwrap_or(code);
            digits
                .parse::<u32>()
                .with_context(|| format!("Invalid warning code '{code}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::{CommandFactory, FromArgMatches};

    fn options_from(args: &[&str]) -> anyhow::Result<DriverOptions> {
        let matches = Cli::command()
            .try_get_matches_from(std::iter::once("dotlink").chain(args.iter().copied()))
            .unwrap();
        Cli::from_arg_matches(&matches).unwrap().driver_options(&matches)
    }

    fn parse(args: &[&str]) -> DriverOptions {
        options_from(args).unwrap()
    }

    #[test]
    fn maps_arguments_to_options() {
        let options = parse(&[
            "-a", "App.json", "-r", "Lib.json", "-d", "refs", "-o", "out", "-c", "copy",
            "-p", "link", "Lib", "-p", "skip", "Lib", "--enable-opt", "sealer", "--disable-opt",
            "beforefieldinit", "Lib", "--feature", "Tracing", "false", "--custom-data",
            "key=value", "--custom-step", "+MarkStep:CleanStep", "--exclude-feature", "COM,ETW",
            "--skip-unresolved", "--strip-security", "false", "--warnaserror", "IL2026;2007",
            "--nowarn", "IL2008",
        ]);

        assert_eq!(
            options.assemblies,
            vec![
                (PathBuf::from("App.json"), RootVisibility::Any),
                (PathBuf::from("Lib.json"), RootVisibility::PublicAndFamily),
            ]
        );
        assert_eq!(options.output_directory, PathBuf::from("out"));
        assert_eq!(options.core_action, AssemblyAction::Copy);
        assert_eq!(
            options.assembly_actions,
            vec![
                (AssemblyAction::Link, "Lib".to_string()),
                (AssemblyAction::Skip, "Lib".to_string()),
            ]
        );
        assert_eq!(
            options.optimizations,
            vec![
                (CodeOptimizations::SEALER, None, true),
                (CodeOptimizations::BEFORE_FIELD_INIT, Some("Lib".to_string()), false),
            ]
        );
        assert_eq!(options.features, vec![("Tracing".to_string(), false)]);
        assert_eq!(options.custom_data, vec![("key".to_string(), "value".to_string())]);
        assert_eq!(options.custom_steps.len(), 1);
        assert_eq!(options.excluded_features, vec!["COM", "ETW"]);
        assert_eq!(options.skip_unresolved, Some(true));
        assert!(!options.strip_security);
        assert!(!options.warn_as_error);
        assert_eq!(options.warn_as_error_codes, vec![2026, 2007]);
        assert_eq!(options.no_warn, vec![2008]);
    }

    #[test]
    fn bare_warnaserror_promotes_everything() {
        let options = parse(&["-a", "App.json", "--warnaserror"]);
        assert!(options.warn_as_error);
        assert!(options.warn_as_error_codes.is_empty());
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(options_from(&["-a", "App.json", "-c", "shrink"]).is_err());
        assert!(options_from(&["-a", "App.json", "--enable-opt", "turbo"]).is_err());
        assert!(options_from(&["--custom-data", "novalue"]).is_err());
    }

    #[test]
    fn root_assemblies_keep_command_line_order() {
        let options = parse(&["-r", "Lib.json", "-a", "App.json", "-r", "Extra.json"]);
        assert_eq!(
            options.assemblies,
            vec![
                (PathBuf::from("Lib.json"), RootVisibility::PublicAndFamily),
                (PathBuf::from("App.json"), RootVisibility::Any),
                (PathBuf::from("Extra.json"), RootVisibility::PublicAndFamily),
            ]
        );
    }

    #[test]
    fn later_optimization_switch_wins() {
        let options = parse(&[
            "-a",
            "App.json",
            "--disable-opt",
            "overrideremoval",
            "--enable-opt",
            "sealer",
            "Lib",
            "--enable-opt",
            "overrideremoval",
        ]);
        assert_eq!(
            options.optimizations,
            vec![
                (CodeOptimizations::OVERRIDE_REMOVAL, None, false),
                (CodeOptimizations::SEALER, Some("Lib".to_string()), true),
                (CodeOptimizations::OVERRIDE_REMOVAL, None, true),
            ]
        );
    }
}
