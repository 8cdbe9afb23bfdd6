use crate::{
    dto::address::{AddressInput, AddressValidation},
    error::{AppError, AppResult},
    models::{Address, AustralianState},
};

/// Check a delivery address. Rules run in a fixed order and the first
/// failure is reported: postcode, then state, then street and suburb.
pub fn validate_address(input: &AddressInput) -> AppResult<Address> {
    let postcode = input.postcode.as_deref().unwrap_or_default();
    if postcode.len() != 4 || !postcode.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation("postcode must be 4 digits"));
    }

    let state: AustralianState = input
        .state
        .as_deref()
        .ok_or_else(|| AppError::validation("invalid state"))?
        .parse()?;

    let address_line1 = input.address_line1.as_deref().map(str::trim).unwrap_or_default();
    let suburb = input.suburb.as_deref().map(str::trim).unwrap_or_default();
    if address_line1.is_empty() || suburb.is_empty() {
        return Err(AppError::validation("address line 1 and suburb required"));
    }

    Ok(Address {
        address_line1: address_line1.to_string(),
        suburb: suburb.to_string(),
        state,
        postcode: postcode.to_string(),
    })
}

pub fn check_address(input: &AddressInput) -> AddressValidation {
    match validate_address(input) {
        Ok(_) => AddressValidation {
            valid: true,
            error: None,
        },
        Err(err) => AddressValidation {
            valid: false,
            error: Some(err.to_string()),
        },
    }
}
