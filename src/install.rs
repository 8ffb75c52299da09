//! `codexbar install`: put the poller into Waybar's config directory and
//! merge the module definition and styles into the user's existing files.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use rust_embed::RustEmbed;
use thiserror::Error;
use tracing::{debug, info};

use codexbar_core::waybar::{
    apply_merge, apply_style, locate, marker_for, ArrayStatus, MergeError, MergeReport,
    ModuleDefinition, StyleReport, CONFIG_CANDIDATES, MODULES_RIGHT, STYLE_CANDIDATES,
};

use crate::config::Settings;

/// Waybar module identifier
pub const MODULE_ID: &str = "custom/codex";
/// Installed poller name under `scripts/`
pub const SCRIPT_NAME: &str = "codexbar";
/// Module definition fragment written next to the Waybar config
pub const MODULE_FRAGMENT: &str = "codexbar-module.jsonc";
/// Stylesheet fragment written next to the Waybar config
pub const STYLE_FRAGMENT: &str = "codexbar.css";

/// Fragments shipped inside the binary, from assets/
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;

/// Errors that abort the installer
#[derive(Debug, Error)]
pub enum InstallError {
    /// `waybar` is not on `PATH`
    #[error("waybar executable not found in PATH; install Waybar first")]
    WaybarNotFound,

    /// Neither `XDG_CONFIG_HOME` nor a home directory is available
    #[error("cannot determine the configuration directory")]
    NoConfigHome,

    /// A fragment is missing from the embedded assets
    #[error("embedded asset missing: {0}")]
    MissingAsset(&'static str),

    /// Config or stylesheet merge failed
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Copying files or setting permissions failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl InstallError {
    /// Process exit code: 2 for a malformed Waybar config, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        match self {
            InstallError::Merge(MergeError::NoClosingBrace | MergeError::Unterminated) => 2,
            _ => 1,
        }
    }

    fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| InstallError::Io { context, source }
    }
}

/// Configuration home: `$XDG_CONFIG_HOME`, else `~/.config`
pub fn config_home() -> Option<PathBuf> {
    match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::home_dir().map(|h| h.join(".config")),
    }
}

/// Search `path_var` (a `PATH`-style list) for an executable named `name`
pub fn find_executable(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    std::env::split_paths(path_var?)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Where the installer puts things
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    /// `<config home>/waybar`
    pub waybar_dir: PathBuf,
    /// `<waybar dir>/scripts/codexbar`
    pub script_path: PathBuf,
}

impl InstallPaths {
    /// Paths under a given configuration home
    pub fn new(config_home: &Path) -> Self {
        let waybar_dir = config_home.join("waybar");
        let script_path = waybar_dir.join("scripts").join(SCRIPT_NAME);
        Self {
            waybar_dir,
            script_path,
        }
    }

    /// Paths under [`config_home`]
    pub fn from_env() -> Result<Self, InstallError> {
        config_home()
            .map(|home| Self::new(&home))
            .ok_or(InstallError::NoConfigHome)
    }
}

/// Outcome of one install run
#[derive(Debug)]
pub struct InstallReport {
    pub script_path: PathBuf,
    pub fragments: Vec<PathBuf>,
    /// `None` when no Waybar config was found
    pub config: Option<(PathBuf, MergeReport)>,
    /// `None` when no stylesheet was found
    pub style: Option<(PathBuf, StyleReport)>,
}

/// Run the installer, print its report and return the process exit code
pub fn run_cli(settings: &Settings) -> u8 {
    match run_from_env(settings) {
        Ok(report) => {
            print_report(&report);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

/// Check for Waybar, then install using the real environment
pub fn run_from_env(settings: &Settings) -> Result<InstallReport, InstallError> {
    let waybar = find_executable("waybar", std::env::var_os("PATH").as_deref())
        .ok_or(InstallError::WaybarNotFound)?;
    debug!("Found waybar at {}", waybar.display());

    let paths = InstallPaths::from_env()?;
    let exe = std::env::current_exe().map_err(InstallError::io("cannot locate own executable"))?;
    install(&paths, &exe, settings, Local::now().naive_local())
}

/// Copy the poller and fragments, then merge config and styles
pub fn install(
    paths: &InstallPaths,
    exe: &Path,
    settings: &Settings,
    stamp: NaiveDateTime,
) -> Result<InstallReport, InstallError> {
    install_script(exe, &paths.script_path)?;

    let mut fragments = Vec::with_capacity(2);
    for name in [MODULE_FRAGMENT, STYLE_FRAGMENT] {
        let dest = paths.waybar_dir.join(name);
        std::fs::write(&dest, asset(name)?)
            .map_err(InstallError::io(format!("failed to write {}", dest.display())))?;
        fragments.push(dest);
    }

    let module = ModuleDefinition::new(
        MODULE_ID,
        format!("{} status", shell_quote(&paths.script_path)),
        settings.waybar.interval_secs,
    );
    let config = match locate(&paths.waybar_dir, CONFIG_CANDIDATES) {
        Some(path) => {
            let report = apply_merge(&path, &module, MODULES_RIGHT, stamp)?;
            Some((path, report))
        }
        None => None,
    };

    let css = String::from_utf8_lossy(&asset(STYLE_FRAGMENT)?).into_owned();
    let style = match locate(&paths.waybar_dir, STYLE_CANDIDATES) {
        Some(path) => {
            let report = apply_style(&path, &css, &marker_for(MODULE_ID), stamp)?;
            Some((path, report))
        }
        None => None,
    };

    Ok(InstallReport {
        script_path: paths.script_path.clone(),
        fragments,
        config,
        style,
    })
}

fn asset(name: &'static str) -> Result<Vec<u8>, InstallError> {
    Assets::get(name)
        .map(|file| file.data.into_owned())
        .ok_or(InstallError::MissingAsset(name))
}

/// Copy `exe` to `dest` with mode 0755, creating parent directories
fn install_script(exe: &Path, dest: &Path) -> Result<(), InstallError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(InstallError::io(format!("failed to create {}", parent.display())))?;
    }

    let same_file = match (exe.canonicalize(), dest.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same_file {
        debug!("Poller already installed at {}", dest.display());
    } else {
        std::fs::copy(exe, dest).map_err(InstallError::io(format!(
            "failed to copy {} to {}",
            exe.display(),
            dest.display()
        )))?;
    }

    set_executable(dest)
        .map_err(InstallError::io(format!("failed to chmod {}", dest.display())))?;
    info!("Installed poller to {}", dest.display());
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Quote a path for Waybar's `sh -c` exec if it has unsafe characters
fn shell_quote(path: &Path) -> String {
    let s = path.to_string_lossy();
    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+~".contains(c));
    if safe {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Print what the installer did and what is left to do by hand
pub fn print_report(report: &InstallReport) {
    println!("Installed poller: {}", report.script_path.display());
    for fragment in &report.fragments {
        println!("Wrote fragment:   {}", fragment.display());
    }

    match &report.config {
        None => println!(
            "No Waybar config found; merge {} into your config manually.",
            MODULE_FRAGMENT
        ),
        Some((path, MergeReport::AlreadyPresent)) => {
            println!("{} already present in {}; skipped.", MODULE_ID, path.display())
        }
        Some((path, MergeReport::Merged { backup, array })) => {
            println!("Merged {} into {}", MODULE_ID, path.display());
            println!("  backup: {}", backup.display());
            match array {
                ArrayStatus::Appended | ArrayStatus::AlreadyListed => {}
                ArrayStatus::Missing | ArrayStatus::Unclosed => println!(
                    "  no usable \"{}\" array; add \"{}\" to a modules list manually.",
                    MODULES_RIGHT, MODULE_ID
                ),
            }
        }
    }

    match &report.style {
        None => println!(
            "No Waybar stylesheet found; append {} to your style.css manually.",
            STYLE_FRAGMENT
        ),
        Some((path, StyleReport::AlreadyPresent)) => {
            println!("Styles already present in {}; skipped.", path.display())
        }
        Some((path, StyleReport::Appended { backup })) => {
            println!("Appended styles to {}", path.display());
            println!("  backup: {}", backup.display());
        }
    }

    println!("Restart Waybar to apply: killall -SIGUSR2 waybar");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;

    fn stamp() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn fake_exe(dir: &Path) -> PathBuf {
        let exe = dir.join("codexbar-build");
        std::fs::write(&exe, b"#!/bin/sh\necho '{}'\n").unwrap();
        exe
    }

    fn setup() -> (tempfile::TempDir, InstallPaths, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(&dir.path().join("config"));
        std::fs::create_dir_all(&paths.waybar_dir).unwrap();
        let exe = fake_exe(dir.path());
        (dir, paths, exe)
    }

    #[test]
    fn test_config_home_xdg() {
        temp_env::with_var("XDG_CONFIG_HOME", Some("/xdg"), || {
            assert_eq!(config_home(), Some(PathBuf::from("/xdg")));
            assert_eq!(
                InstallPaths::from_env().unwrap().script_path,
                PathBuf::from("/xdg/waybar/scripts/codexbar")
            );
        });
    }

    #[test]
    fn test_config_home_fallback() {
        temp_env::with_vars(
            [("XDG_CONFIG_HOME", None), ("HOME", Some("/home/tester"))],
            || {
                assert_eq!(config_home(), Some(PathBuf::from("/home/tester/.config")));
            },
        );
    }

    #[test]
    fn test_find_executable() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("waybar");
        std::fs::write(&bin, "").unwrap();

        let path_var = std::env::join_paths([Path::new("/nonexistent"), dir.path()]).unwrap();
        assert_eq!(find_executable("waybar", Some(path_var.as_os_str())), None);

        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_executable("waybar", Some(path_var.as_os_str())), Some(bin));
        assert_eq!(find_executable("waybar", None), None);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(InstallError::WaybarNotFound.exit_code(), 1);
        assert_eq!(
            InstallError::Merge(MergeError::NoClosingBrace).exit_code(),
            2
        );
        assert_eq!(InstallError::Merge(MergeError::Unterminated).exit_code(), 2);
        assert_eq!(InstallError::MissingAsset(STYLE_FRAGMENT).exit_code(), 1);
    }

    #[test]
    fn test_run_cli_without_waybar() {
        let dir = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                ("PATH", Some(dir.path().as_os_str())),
                ("XDG_CONFIG_HOME", Some(dir.path().as_os_str())),
            ],
            || {
                assert_eq!(run_cli(&Settings::default()), 1);
            },
        );
        assert!(!dir.path().join("waybar").exists());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(
            shell_quote(Path::new("/home/u/.config/waybar/scripts/codexbar")),
            "/home/u/.config/waybar/scripts/codexbar"
        );
        assert_eq!(
            shell_quote(Path::new("/home/my user/codexbar")),
            "'/home/my user/codexbar'"
        );
    }

    #[test]
    fn test_embedded_fragments() {
        let css = String::from_utf8(asset(STYLE_FRAGMENT).unwrap()).unwrap();
        assert!(css.contains(&marker_for(MODULE_ID)));
        let module = String::from_utf8(asset(MODULE_FRAGMENT).unwrap()).unwrap();
        assert!(module.contains(MODULE_ID));
    }

    #[test]
    fn test_install_full() {
        let (_dir, paths, exe) = setup();
        let config = paths.waybar_dir.join("config.jsonc");
        let style = paths.waybar_dir.join("style.css");
        std::fs::write(&config, "{\n  \"modules-right\": [\"clock\"]\n}\n").unwrap();
        std::fs::write(&style, "* { border: none; }\n").unwrap();

        let report = install(&paths, &exe, &Settings::default(), stamp()).unwrap();

        let mode = std::fs::metadata(&paths.script_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            std::fs::read(&paths.script_path).unwrap(),
            std::fs::read(&exe).unwrap()
        );
        assert_eq!(
            std::fs::read(paths.waybar_dir.join(MODULE_FRAGMENT)).unwrap(),
            asset(MODULE_FRAGMENT).unwrap()
        );
        assert_eq!(report.fragments.len(), 2);

        match report.config {
            Some((path, MergeReport::Merged { array, backup })) => {
                assert_eq!(path, config);
                assert_eq!(array, ArrayStatus::Appended);
                assert_eq!(
                    std::fs::read_to_string(backup).unwrap(),
                    "{\n  \"modules-right\": [\"clock\"]\n}\n"
                );
            }
            other => panic!("Expected merged config, got {:?}", other),
        }
        let merged = std::fs::read_to_string(&config).unwrap();
        assert!(merged.contains(r#"["clock", "custom/codex"]"#));
        assert!(merged.contains(&format!(
            "\"exec\": \"{} status\"",
            paths.script_path.display()
        )));

        assert!(matches!(report.style, Some((_, StyleReport::Appended { .. }))));
        assert!(std::fs::read_to_string(&style)
            .unwrap()
            .contains("#custom-codex"));
    }

    #[test]
    fn test_install_twice_is_noop() {
        let (_dir, paths, exe) = setup();
        let config = paths.waybar_dir.join("config");
        std::fs::write(&config, "{\"modules-right\": []}").unwrap();
        std::fs::write(paths.waybar_dir.join("style.css"), "").unwrap();

        install(&paths, &exe, &Settings::default(), stamp()).unwrap();
        let after_first = std::fs::read_to_string(&config).unwrap();
        let report = install(&paths, &exe, &Settings::default(), stamp()).unwrap();

        assert!(matches!(report.config, Some((_, MergeReport::AlreadyPresent))));
        assert!(matches!(report.style, Some((_, StyleReport::AlreadyPresent))));
        assert_eq!(std::fs::read_to_string(&config).unwrap(), after_first);
    }

    #[test]
    fn test_install_without_waybar_files() {
        let (_dir, paths, exe) = setup();
        let report = install(&paths, &exe, &Settings::default(), stamp()).unwrap();
        assert!(report.config.is_none());
        assert!(report.style.is_none());
        assert!(paths.script_path.exists());
        assert!(paths.waybar_dir.join(STYLE_FRAGMENT).exists());
    }

    #[test]
    fn test_install_malformed_config() {
        let (_dir, paths, exe) = setup();
        std::fs::write(paths.waybar_dir.join("config.jsonc"), "[\"not an object\"").unwrap();

        let err = install(&paths, &exe, &Settings::default(), stamp()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
