use crate::cli::{Args, DitherArg, MethodArg};
use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Saved options file
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub name: Option<String>,
    pub config: OptionsJson,
}

/// Conversion options as stored on disk (input and output directories are not stored)
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsJson {
    pub recursive: Option<bool>,
    pub remove_originals: Option<bool>,
    pub silent: Option<bool>,
    pub qb_color: Option<u8>,
    pub qb_gray_color: Option<u8>,
    pub qb_gray: Option<u8>,
    pub method: Option<MethodArg>,
    pub dither: Option<DitherArg>,
    pub jobs: Option<usize>,
    pub batch_size_mib: Option<u64>,
    pub chk_bit: Option<bool>,
    pub report: Option<bool>,
    pub log: Option<u8>,
}

impl From<&Args> for OptionsJson {
    fn from(args: &Args) -> Self {
        Self {
            recursive: Some(args.recursive),
            remove_originals: Some(args.remove),
            silent: Some(args.silent),
            qb_color: args.qb_color,
            qb_gray_color: args.qb_gray_color,
            qb_gray: args.qb_gray,
            method: Some(args.method),
            dither: Some(args.dither),
            jobs: Some(args.jobs),
            batch_size_mib: Some(args.batch_size_mib),
            chk_bit: Some(args.chk_bit),
            report: Some(args.report),
            log: Some(args.log),
        }
    }
}

/// Read and parse an options file
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

impl Args {
    /// Load configuration from `--config` and merge it into these arguments.
    /// Values given on the command line take precedence over the file.
    pub fn load_and_merge_config(&mut self, matches: &ArgMatches) -> Result<()> {
        if let Some(config_path) = self.config_file.clone() {
            let config = load_config(&config_path)?;
            self.merge_from_config(config.config, matches);
        }
        Ok(())
    }

    /// Apply every option the file sets and the command line did not
    pub fn merge_from_config(&mut self, config: OptionsJson, matches: &ArgMatches) {
        let from_cli = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);

        fn apply<T>(target: &mut T, value: Option<T>, explicit: bool) {
            if let (false, Some(value)) = (explicit, value) {
                *target = value;
            }
        }

        apply(&mut self.recursive, config.recursive, from_cli("recursive"));
        apply(&mut self.remove, config.remove_originals, from_cli("remove"));
        apply(&mut self.silent, config.silent, from_cli("silent"));
        apply(&mut self.method, config.method, from_cli("method"));
        apply(&mut self.dither, config.dither, from_cli("dither"));
        apply(&mut self.jobs, config.jobs, from_cli("jobs"));
        apply(&mut self.batch_size_mib, config.batch_size_mib, from_cli("batch_size_mib"));
        apply(&mut self.chk_bit, config.chk_bit, from_cli("chk_bit"));
        apply(&mut self.report, config.report, from_cli("report"));
        apply(&mut self.log, config.log, from_cli("log"));

        // Bit depths from a file are not range-checked here; out-of-range
        // values fail the affected files during conversion
        if !from_cli("qb_color") && config.qb_color.is_some() {
            self.qb_color = config.qb_color;
        }
        if !from_cli("qb_gray_color") && config.qb_gray_color.is_some() {
            self.qb_gray_color = config.qb_gray_color;
        }
        if !from_cli("qb_gray") && config.qb_gray.is_some() {
            self.qb_gray = config.qb_gray;
        }
    }

    /// Write the effective options to `path` as pretty JSON
    pub fn save_config_to(&self, path: &Path) -> Result<()> {
        let file = ConfigFile {
            name: path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string()),
            config: OptionsJson::from(self),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&file).context("Failed to serialize options")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
