//! Validation helpers for DTOs.

use validator::ValidationError;

/// Room tokens are exactly 8 lowercase alphanumeric characters.
const ROOM_ID_LENGTH: usize = 8;

/// Validates that a room id is a well-formed share token.
///
/// # Examples
///
/// ```ignore
/// validate_room_id("ab12cd34") // Ok
/// validate_room_id("AB12CD34") // Err - uppercase
/// validate_room_id("ab12cd3")  // Err - too short
/// ```
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    if id.len() != ROOM_ID_LENGTH {
        let mut err = ValidationError::new("room_id_length");
        err.message = Some(
            format!(
                "room id must be exactly {} characters (got {})",
                ROOM_ID_LENGTH,
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        let mut err = ValidationError::new("room_id_format");
        err.message = Some("room id must contain only lowercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_tokens() {
        assert!(validate_room_id("ab12cd34").is_ok());
        assert!(validate_room_id("00000000").is_ok());
        assert!(validate_room_id("zzzzzzzz").is_ok());
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert!(validate_room_id("ab12cd3").is_err());
        assert!(validate_room_id("ab12cd345").is_err());
        assert!(validate_room_id("").is_err());
    }

    #[test]
    fn rejects_wrong_characters() {
        assert!(validate_room_id("AB12CD34").is_err());
        assert!(validate_room_id("ab12cd3_").is_err());
        assert!(validate_room_id("ab12 d34").is_err());
    }
}
