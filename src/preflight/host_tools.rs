//! Host tool availability checks.

use crate::artifact::image::IMAGE_TOOLS;
use crate::artifact::iso::ISO_TOOLS;
use crate::host::Host;
use crate::install::REQUIRED_TOOLS;

use super::types::CheckResult;

/// FreeBSD package (or "base") providing a tool.
pub fn package_hint(tool: &str) -> &'static str {
    match tool {
        "curl" => "pkg install curl",
        "xz" | "xzcat" | "tar" | "makefs" | "mdconfig" | "gpart" | "newfs_msdos" | "dd"
        | "zpool" | "zfs" | "geom" | "diskinfo" => "part of the FreeBSD base system",
        "pkg" => "bootstrap with 'pkg bootstrap'",
        _ => "install it from ports or packages",
    }
}

fn check_group(host: &impl Host, purpose: &str, tools: &[&str]) -> Vec<CheckResult> {
    tools
        .iter()
        .map(|tool| {
            let name = format!("{} ({})", tool, purpose);
            if host.has_tool(tool) {
                CheckResult::pass(&name)
            } else {
                CheckResult::fail(&name, &format!("Not found; {}", package_hint(tool)))
            }
        })
        .collect()
}

/// One check per tool, grouped by the pipeline that needs it.
pub fn check_host_tools(host: &impl Host) -> Vec<CheckResult> {
    let mut results = Vec::new();
    results.extend(check_group(host, "install", REQUIRED_TOOLS));
    results.extend(check_group(host, "image", IMAGE_TOOLS));
    results.extend(check_group(host, "iso", ISO_TOOLS));
    results
}
