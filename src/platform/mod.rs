//! Host platform detection: privileges, CPU architecture, kernel and board.

mod release;

pub use release::{DebianCodename, OsRelease, ReleaseProbe, detect_codename, detect_os};

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use nix::sys::utsname::uname;
use nix::unistd::geteuid;
use serde::Serialize;

const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";
const CPUINFO: &str = "/proc/cpuinfo";

/// Whether the effective user is root.
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// True on Linux and macOS, the systems install scripts target.
pub fn is_linux() -> bool {
    matches!(std::env::consts::OS, "linux" | "macos")
}

/// Hardware name as reported by `uname -m`.
pub fn machine() -> String {
    match uname() {
        Ok(info) => info.machine().to_string_lossy().into_owned(),
        Err(e) => {
            tracing::debug!("uname failed, using compile-time arch: {}", e);
            std::env::consts::ARCH.to_string()
        }
    }
}

/// Kernel release as reported by `uname -r`.
pub fn kernel_release() -> String {
    match uname() {
        Ok(info) => info.release().to_string_lossy().into_owned(),
        Err(e) => {
            tracing::debug!("uname failed: {}", e);
            String::new()
        }
    }
}

/// ARM with hardware floating point (`armv6l`, `armv7l`, ...).
pub fn is_armhf() -> bool {
    is_armhf_machine(&machine())
}

fn is_armhf_machine(machine: &str) -> bool {
    // "armv" + one character + "l"
    let bytes = machine.as_bytes();
    bytes.len() >= 6 && bytes.starts_with(b"armv") && bytes[5] == b'l'
}

pub fn is_armv6() -> bool {
    machine() == "armv6l"
}

pub fn is_armv7() -> bool {
    machine() == "armv7l"
}

pub fn is_armv8() -> bool {
    machine() == "armv8l"
}

pub fn is_arm64() -> bool {
    machine() == "aarch64"
}

/// Whether this program was built for a 32-bit userspace.
pub fn userspace_is_32bit() -> bool {
    cfg!(target_pointer_width = "32")
}

/// Leading numeric components of a version, e.g. `6.1.21-v8+` gives
/// `[6, 1, 21]`.
fn numeric_components(version: &str) -> Vec<u64> {
    version
        .split(['.', '-', '+'])
        .map_while(|part| part.parse::<u64>().ok())
        .collect()
}

fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = numeric_components(left);
    let right = numeric_components(right);
    let len = left.len().max(right.len());
    for i in 0..len {
        let a = left.get(i).copied().unwrap_or(0);
        let b = right.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether the running kernel is at least `version`.
pub fn kernel_minimum(version: impl ToString) -> bool {
    kernel_at_least(&kernel_release(), &version.to_string())
}

fn kernel_at_least(release: &str, minimum: &str) -> bool {
    compare_versions(release, minimum) != Ordering::Less
}

/// Board model string, e.g. `Raspberry Pi 4 Model B Rev 1.4`.
pub fn board_model() -> Option<String> {
    if let Ok(raw) = fs::read(DEVICE_TREE_MODEL) {
        let model = String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if !model.is_empty() {
            return Some(model);
        }
    }
    fs::read_to_string(CPUINFO)
        .ok()
        .and_then(|text| parse_cpuinfo_model(&text))
}

fn parse_cpuinfo_model(cpuinfo: &str) -> Option<String> {
    cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "Model")
            .then(|| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

pub fn is_raspberry_pi() -> bool {
    board_model().is_some_and(|model| model.starts_with("Raspberry Pi"))
}

/// Whether kernel modules for the running kernel are installed. A missing
/// directory means the kernel was updated and the system not yet rebooted.
pub fn kernel_modules_present() -> bool {
    Path::new("/lib/modules").join(kernel_release()).exists()
}

/// Snapshot of the detected platform.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformReport {
    pub os: Option<OsRelease>,
    pub codename: Option<DebianCodename>,
    pub machine: String,
    pub kernel: String,
    pub board_model: Option<String>,
    pub is_root: bool,
    pub userspace_32bit: bool,
}

impl PlatformReport {
    pub fn collect(probe: &ReleaseProbe) -> Self {
        Self {
            os: detect_os(probe),
            codename: detect_codename(probe),
            machine: machine(),
            kernel: kernel_release(),
            board_model: board_model(),
            is_root: is_root(),
            userspace_32bit: userspace_is_32bit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_armhf_machines() {
        assert!(is_armhf_machine("armv6l"));
        assert!(is_armhf_machine("armv7l"));
        assert!(is_armhf_machine("armv8l"));
        assert!(!is_armhf_machine("aarch64"));
        assert!(!is_armhf_machine("x86_64"));
        assert!(!is_armhf_machine("armv7"));
    }

    #[test]
    fn test_numeric_components() {
        assert_eq!(numeric_components("6.1.21-v8+"), vec![6, 1, 21]);
        assert_eq!(numeric_components("5.15.0-91-generic"), vec![5, 15, 0, 91]);
        assert_eq!(numeric_components("4.19"), vec![4, 19]);
        assert!(numeric_components("rolling").is_empty());
    }

    #[test]
    fn test_kernel_at_least() {
        assert!(kernel_at_least("6.1.21-v8+", "6.1"));
        assert!(kernel_at_least("6.1.21-v8+", "5.10.103"));
        assert!(kernel_at_least("5.10", "5.10.0"));
        assert!(!kernel_at_least("5.4.83", "5.10"));
        // Plain string comparison would get this one wrong.
        assert!(kernel_at_least("10.0.0", "9.9"));
    }

    #[test]
    fn test_parse_cpuinfo_model() {
        let cpuinfo = "processor\t: 0\nHardware\t: BCM2835\nModel\t\t: Raspberry Pi 3 Model B Rev 1.2\n";
        assert_eq!(
            parse_cpuinfo_model(cpuinfo).as_deref(),
            Some("Raspberry Pi 3 Model B Rev 1.2")
        );
        assert_eq!(parse_cpuinfo_model("model name\t: Intel\n"), None);
    }

    #[test]
    fn test_host_queries_do_not_panic() {
        assert!(!machine().is_empty());
        let _report = PlatformReport::collect(&ReleaseProbe::default());
        assert_eq!(is_root(), geteuid().is_root());
    }
}
