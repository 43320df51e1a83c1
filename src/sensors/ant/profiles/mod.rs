//! ANT+ Device Profiles
//!
//! Page parsers and decoders for the supported ANT+ device profiles.

pub mod hr;
pub mod power;
pub mod sdm;
pub mod speed_cadence;

use super::PAGE_LEN;
use crate::sensors::types::DecodeError;

/// Manufacturer information common page
pub const MANUFACTURER_INFO_PAGE: u8 = 80;
/// Product information common page
pub const PRODUCT_INFO_PAGE: u8 = 81;
/// Battery status common page
pub const BATTERY_STATUS_PAGE: u8 = 82;

/// Common trait for ANT+ profile data pages
pub trait AntProfilePage: Sized {
    /// Get the page number
    fn page_number(&self) -> u8;

    /// Parse raw data into this page type
    fn parse(data: &[u8]) -> Result<Self, DecodeError>;
}

/// Check the payload length and return its page number without the toggle bit.
pub fn page_number(data: &[u8]) -> Result<u8, DecodeError> {
    if data.len() < PAGE_LEN {
        return Err(DecodeError::TooShort {
            needed: PAGE_LEN,
            actual: data.len(),
        });
    }
    Ok(data[0] & 0x7F)
}

/// Whether `page` is one of the identification pages every device interleaves.
pub fn is_common_page(page: u8) -> bool {
    matches!(
        page,
        MANUFACTURER_INFO_PAGE | PRODUCT_INFO_PAGE | BATTERY_STATUS_PAGE
    )
}
