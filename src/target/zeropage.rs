//! Zero-page allocation validation: rejects a proposed `(address, size)`
//! mapping that overlaps a platform's reserved ranges, built directly on
//! [`crate::platform::TargetMachine::zero_page_category`].

use crate::common::errors::TargetError;
use crate::platform::{TargetMachine, ZeroPageCategory};

/// Validates that every byte in `[address, address + size)` is in a safe
/// zero-page range for `machine`. `size` of zero is rejected as
/// meaningless rather than accepted as vacuously safe.
pub fn validate(machine: &TargetMachine, address: u16, size: u16) -> Result<(), TargetError> {
    if size == 0 {
        return Err(TargetError::NotZeroPage { address });
    }
    let end = address.checked_add(size - 1).ok_or(TargetError::NotZeroPage { address })?;
    if end > 0xFF {
        return Err(TargetError::NotZeroPage { address });
    }

    for offset in address..=end {
        if let ZeroPageCategory::Reserved(range) = machine.zero_page_category(offset) {
            return Err(TargetError::ReservedZeroPage {
                address,
                range: reserved_range_label(&range),
            });
        }
    }
    Ok(())
}

/// [`TargetError::ReservedZeroPage`] carries a `&'static str`, so the
/// owned description from [`crate::platform::ZeroPageCategory::Reserved`]
/// is mapped back onto one of the fixed labels it can only ever produce.
fn reserved_range_label(description: &str) -> &'static str {
    match description {
        "CPU I/O port" => "CPU I/O port",
        "KERNAL workspace" => "KERNAL workspace",
        _ => "outside zero page",
    }
}
