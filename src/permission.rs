use tracing::info;

/// Outcome of a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// Scanning is allowed
    Granted,
    /// The user or platform refused access
    Denied,
    /// No decision has been made yet
    Undetermined,
}

/// Access to the OS permission that BLE scanning requires
pub trait PermissionGate: Send + Sync {
    /// Current permission state
    fn check(&self) -> PermissionStatus;

    /// Ask the OS for the permission; the answer is not reported back
    fn request(&self);
}

/// Check the scanning permission once and request it when missing
///
/// Fire-and-forget: the result of the request is never observed and the
/// caller proceeds regardless.
pub fn request_scan_permission(gate: &dyn PermissionGate) {
    let status = gate.check();
    if status == PermissionStatus::Granted {
        info!("Bluetooth scanning permission already granted");
        return;
    }

    info!("Bluetooth scanning permission is {status:?}, requesting it");
    gate.request();
}

/// Permission gate for desktop Bluetooth stacks
///
/// BlueZ and WinRT authorize at adapter access, so a denial only shows up as
/// a backend error. macOS asks the user the first time the Bluetooth stack is
/// touched, which happens when the backend binds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformPermission;

impl PermissionGate for PlatformPermission {
    fn check(&self) -> PermissionStatus {
        if cfg!(target_os = "macos") {
            PermissionStatus::Undetermined
        } else {
            PermissionStatus::Granted
        }
    }

    fn request(&self) {
        info!("Bluetooth permission prompt is raised by the system when scanning starts");
    }
}
