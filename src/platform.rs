use log::warn;
use nix::sys::utsname::uname;

use crate::schema::PlatformInfo;

/// Host description recorded alongside the results.
pub fn platform_info() -> PlatformInfo {
    match uname() {
        Ok(u) => {
            let machine = u.machine().to_string_lossy().into_owned();
            PlatformInfo {
                system: u.sysname().to_string_lossy().into_owned(),
                node: u.nodename().to_string_lossy().into_owned(),
                release: u.release().to_string_lossy().into_owned(),
                version: u.version().to_string_lossy().into_owned(),
                processor: machine.clone(),
                machine,
            }
        }
        Err(e) => {
            warn!("uname failed: {e}");
            PlatformInfo::default()
        }
    }
}
