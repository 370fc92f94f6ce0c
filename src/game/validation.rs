use crate::error::CoreError;

const MAX_FEN_LEN: usize = 100;

pub(super) fn validate_square(name: &str, square: &str) -> Result<(), CoreError> {
    let bytes = square.as_bytes();
    let valid = bytes.len() == 2
        && (b'a'..=b'h').contains(&bytes[0])
        && (b'1'..=b'8').contains(&bytes[1]);
    if !valid {
        return Err(CoreError::validation(format!(
            "{name} must be a square between a1 and h8"
        )));
    }
    Ok(())
}

pub(super) fn validate_promotion(promotion: Option<&str>) -> Result<(), CoreError> {
    match promotion {
        None => Ok(()),
        Some(piece) if matches!(piece.to_ascii_lowercase().as_str(), "q" | "r" | "b" | "n") => {
            Ok(())
        }
        Some(_) => Err(CoreError::validation("promotion must be one of q, r, b, n")),
    }
}

pub(super) fn validate_fen(fen: &str) -> Result<(), CoreError> {
    let fen = fen.trim();
    if fen.is_empty() {
        return Err(CoreError::validation("fen is required"));
    }
    if fen.len() > MAX_FEN_LEN {
        return Err(CoreError::validation("fen is too long"));
    }
    if fen.split_whitespace().count() < 4 {
        return Err(CoreError::validation("fen is malformed"));
    }
    Ok(())
}

/// The new history must be the recorded one plus exactly one move.
pub(super) fn validate_history(recorded: &[String], updated: &[String]) -> Result<(), CoreError> {
    if updated.len() != recorded.len() + 1 || !updated.starts_with(recorded) {
        return Err(CoreError::validation(
            "move history must extend the recorded history by one move",
        ));
    }
    if updated.last().is_some_and(|mv| mv.trim().is_empty()) {
        return Err(CoreError::validation("move history contains an empty move"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squares() {
        assert!(validate_square("from", "e2").is_ok());
        assert!(validate_square("from", "h8").is_ok());
        assert!(validate_square("from", "i1").is_err());
        assert!(validate_square("from", "a9").is_err());
        assert!(validate_square("from", "e").is_err());
    }

    #[test]
    fn promotions() {
        assert!(validate_promotion(None).is_ok());
        assert!(validate_promotion(Some("Q")).is_ok());
        assert!(validate_promotion(Some("k")).is_err());
    }

    #[test]
    fn history_must_grow_by_one() {
        let recorded = vec!["e4".to_string()];
        assert!(validate_history(&recorded, &["e4".into(), "e5".into()]).is_ok());
        assert!(validate_history(&recorded, &["d4".into(), "e5".into()]).is_err());
        assert!(validate_history(&recorded, &["e4".into()]).is_err());
        assert!(validate_history(&[], &["".into()]).is_err());
    }
}
