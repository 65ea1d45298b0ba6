use std::{env, fs};

/// Source used when the local host name cannot be determined.
pub(crate) const FALLBACK_SOURCE: &str = "wavefront_proxy_sender";

/// Returns the local host name, or [`FALLBACK_SOURCE`] if it cannot be determined.
pub(crate) fn default_source() -> String {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_SOURCE.to_string())
}

/// Encodes a `MAJOR.MINOR.PATCH` version as the gauge value `MAJOR.mmpp`.
///
/// Minor and patch are zero-padded to two digits each, so `1.2.3` becomes `1.0203` and `0.12.0` becomes `0.12`. Any
/// pre-release or build suffix is ignored.
pub(crate) fn version_gauge_value(version: &str) -> Option<f64> {
    let core = version.split(['-', '+']).next()?;
    let mut parts = core.split('.');
    let (major, minor, patch) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let major = major.parse::<u32>().ok()?;
    let minor = minor.parse::<u32>().ok()?;
    let patch = patch.parse::<u32>().ok()?;
    if minor > 99 || patch > 99 {
        return None;
    }

    format!("{major}.{minor:02}{patch:02}").parse().ok()
}
