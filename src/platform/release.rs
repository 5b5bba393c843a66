//! Linux distribution and release detection.
//!
//! Detection is split into gathering ([`ReleaseProbe::gather`]) and deciding
//! ([`detect_os`], [`detect_codename`]) so the rules can be tested against
//! canned file contents.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::fsops::expand_path;

const OS_RELEASE: &str = "/etc/os-release";
const RPI_ISSUE: &str = "/etc/rpi-issue";

/// Operating systems install scripts usually care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OsRelease {
    Raspbian,
    Debian,
    Kano,
    Mate,
    PiTop,
    Ubuntu,
    Darwin,
    Kali,
}

impl OsRelease {
    /// Checked in this order against `/etc/os-release`; later entries win.
    const SEARCH_ORDER: [OsRelease; 8] = [
        OsRelease::Raspbian,
        OsRelease::Debian,
        OsRelease::Kano,
        OsRelease::Mate,
        OsRelease::PiTop,
        OsRelease::Ubuntu,
        OsRelease::Darwin,
        OsRelease::Kali,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OsRelease::Raspbian => "Raspbian",
            OsRelease::Debian => "Debian",
            OsRelease::Kano => "Kano",
            OsRelease::Mate => "Mate",
            OsRelease::PiTop => "PiTop",
            OsRelease::Ubuntu => "Ubuntu",
            OsRelease::Darwin => "Darwin",
            OsRelease::Kali => "Kali",
        }
    }
}

impl fmt::Display for OsRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Debian release names reported for Raspberry Pi OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebianCodename {
    Bookworm,
    Bullseye,
    Buster,
    Stretch,
    Jessie,
    Wheezy,
    Unstable,
}

impl DebianCodename {
    const SEARCH_ORDER: [DebianCodename; 6] = [
        DebianCodename::Bookworm,
        DebianCodename::Bullseye,
        DebianCodename::Buster,
        DebianCodename::Stretch,
        DebianCodename::Jessie,
        DebianCodename::Wheezy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DebianCodename::Bookworm => "bookworm",
            DebianCodename::Bullseye => "bullseye",
            DebianCodename::Buster => "buster",
            DebianCodename::Stretch => "stretch",
            DebianCodename::Jessie => "jessie",
            DebianCodename::Wheezy => "wheezy",
            DebianCodename::Unstable => "unstable",
        }
    }
}

impl fmt::Display for DebianCodename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the release rules look at.
#[derive(Debug, Clone, Default)]
pub struct ReleaseProbe {
    /// Contents of `/etc/os-release`, if present.
    pub os_release: Option<String>,
    /// Contents of `/etc/rpi-issue`, if present.
    pub rpi_issue: Option<String>,
    /// Whether `apt-get` is on the path.
    pub has_apt: bool,
    /// `~/.kano-settings` or `~/.kanoprofile` exists.
    pub kano_home: bool,
    /// `~/.config/ubuntu-mate` exists.
    pub mate_home: bool,
    /// Running on macOS.
    pub darwin: bool,
}

impl ReleaseProbe {
    /// Read the probe inputs from this machine.
    pub fn gather(has_apt: bool) -> Self {
        Self {
            os_release: read_optional(OS_RELEASE),
            rpi_issue: read_optional(RPI_ISSUE),
            has_apt,
            kano_home: expand_path("~/.kano-settings").is_dir()
                || expand_path("~/.kanoprofile").is_dir(),
            mate_home: expand_path("~/.config/ubuntu-mate").is_dir(),
            darwin: cfg!(target_os = "macos"),
        }
    }
}

fn read_optional(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    if !path.exists() {
        return None;
    }
    // Present but unreadable still counts as present.
    Some(fs::read_to_string(path).unwrap_or_default())
}

/// Decide which OS this is.
pub fn detect_os(probe: &ReleaseProbe) -> Option<OsRelease> {
    let mut release = None;

    if let Some(os_release) = &probe.os_release {
        if os_release.contains("Raspbian") {
            release = Some(OsRelease::Raspbian);
        }
        if probe
            .rpi_issue
            .as_deref()
            .is_some_and(|issue| issue.contains("Raspberry Pi"))
        {
            release = Some(OsRelease::Raspbian);
        }
        if probe.has_apt {
            for candidate in OsRelease::SEARCH_ORDER {
                if os_release.contains(candidate.name()) {
                    release = Some(candidate);
                }
            }
            if release == Some(OsRelease::Debian) && probe.rpi_issue.is_some() {
                release = Some(OsRelease::Raspbian);
            }
        }
    }

    if probe.kano_home {
        release = Some(OsRelease::Kano);
    }
    if probe.mate_home {
        release = Some(OsRelease::Mate);
    }
    if probe.darwin {
        release = Some(OsRelease::Darwin);
    }
    release
}

/// Debian codename, only meaningful on Raspberry Pi OS.
pub fn detect_codename(probe: &ReleaseProbe) -> Option<DebianCodename> {
    if detect_os(probe) != Some(OsRelease::Raspbian) {
        return None;
    }
    let os_release = probe.os_release.as_deref()?;
    if os_release.contains("/sid") {
        return Some(DebianCodename::Unstable);
    }
    DebianCodename::SEARCH_ORDER
        .into_iter()
        .find(|codename| os_release.contains(codename.name()))
}
