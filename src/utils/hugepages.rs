// src/utils/hugepages.rs
//! Huge page reservation
//!
//! The full dataset (2080 MiB), the cache (256 MiB) and one scratchpad per VM
//! only get large-page backing if the kernel has enough 2 MiB pages reserved.
//! On Linux, running as root, this bumps `vm.nr_hugepages` before the engine
//! allocates anything. Everything here is best effort: the engine falls back
//! to standard pages on its own.

/// Pages for the dataset plus cache; one more is added per VM
pub const BASE_PAGES: usize = 1168;

/// Outcome of a reservation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The kernel now has at least this many pages reserved
    Reserved(usize),
    /// Enough pages were already reserved
    AlreadySufficient(usize),
    /// Not attempted (unsupported platform or missing privileges)
    Skipped(&'static str),
    /// The attempt failed
    Failed(String),
}

/// Number of huge pages needed for `threads` VMs
pub fn pages_needed(threads: usize) -> usize {
    BASE_PAGES + threads
}

/// Tries to reserve enough huge pages for `threads` VMs and logs the outcome
pub fn reserve(threads: usize) -> Reservation {
    let outcome = reserve_pages(pages_needed(threads));
    match &outcome {
        Reservation::Reserved(n) => log::info!("Huge pages set up successfully: {} pages", n),
        Reservation::AlreadySufficient(n) => log::debug!("{} huge pages already reserved", n),
        Reservation::Skipped(why) => log::info!("Huge pages not set up: {}", why),
        Reservation::Failed(e) => log::warn!("Error setting up huge pages: {}", e),
    }
    outcome
}

#[cfg(target_os = "linux")]
fn reserve_pages(wanted: usize) -> Reservation {
    const NR_HUGEPAGES: &str = "/proc/sys/vm/nr_hugepages";

    let current = std::fs::read_to_string(NR_HUGEPAGES)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if current >= wanted {
        return Reservation::AlreadySufficient(current);
    }

    if !is_root() {
        return Reservation::Skipped("root privileges required");
    }

    if let Err(e) = std::fs::write(NR_HUGEPAGES, wanted.to_string()) {
        return Reservation::Failed(e.to_string());
    }
    Reservation::Reserved(wanted)
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(target_os = "linux"))]
fn reserve_pages(_wanted: usize) -> Reservation {
    Reservation::Skipped("unsupported platform")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_page_per_thread() {
        assert_eq!(pages_needed(0), 1168);
        assert_eq!(pages_needed(8), 1176);
    }
}
