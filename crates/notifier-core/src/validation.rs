//! Input validation for identifiers, seeds and numeric settings

use crate::{CoreError, Identifier};

/// Returns the trimmed identifier, rejecting empty input and embedded whitespace
pub fn validate_identifier(raw: &str) -> Result<&str, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidIdentifier(
            "identifier must not be empty".to_string(),
        ));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidIdentifier(format!(
            "identifier must not contain whitespace: {:?}",
            trimmed
        )));
    }
    Ok(trimmed)
}

pub fn validate_positive(name: &str, value: u64) -> Result<u64, CoreError> {
    if value == 0 {
        return Err(CoreError::Validation(format!(
            "{} must be greater than zero",
            name
        )));
    }
    Ok(value)
}

/// A watch supplied at startup rather than through the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedWatch {
    pub nickname: String,
    pub identifier: Identifier,
}

/// Parses a `nickname:identifier` pair. The nickname may be empty but the
/// separator is required.
pub fn parse_seed_watch(entry: &str) -> Result<SeedWatch, CoreError> {
    let (nickname, raw) = entry.split_once(':').ok_or_else(|| {
        CoreError::Validation(format!(
            "seed watch {:?} must use the form nickname:identifier",
            entry
        ))
    })?;

    Ok(SeedWatch {
        nickname: nickname.trim().to_string(),
        identifier: Identifier::parse(raw)?,
    })
}

/// Parses a comma separated list of seed watches, skipping blank entries
pub fn parse_seed_list(list: &str) -> Result<Vec<SeedWatch>, CoreError> {
    list.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(parse_seed_watch)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentifierKind;

    #[test]
    fn identifier_is_trimmed() {
        assert_eq!(validate_identifier("  bc1qxyz\t").unwrap(), "bc1qxyz");
    }

    #[test]
    fn identifier_rejects_blank_and_inner_whitespace() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier(" \n ").is_err());
        assert!(validate_identifier("bc1q xyz").is_err());
    }

    #[test]
    fn zero_is_not_positive() {
        assert!(validate_positive("lookahead", 0).is_err());
        assert_eq!(validate_positive("lookahead", 20).unwrap(), 20);
    }

    #[test]
    fn seed_watch_splits_on_first_colon() {
        let seed = parse_seed_watch("cold storage:xpub6CUGRUo").unwrap();
        assert_eq!(seed.nickname, "cold storage");
        assert_eq!(
            seed.identifier,
            Identifier::ExtendedKey("xpub6CUGRUo".to_string())
        );

        let seed = parse_seed_watch(":1BoatSLRHtKNngkdXEeobR76b53LETtpyT").unwrap();
        assert_eq!(seed.nickname, "");
        assert_eq!(seed.identifier.kind(), IdentifierKind::Address);
    }

    #[test]
    fn seed_watch_requires_separator_and_identifier() {
        assert!(parse_seed_watch("no-separator").is_err());
        assert!(parse_seed_watch("nick:").is_err());
    }

    #[test]
    fn seed_list_skips_blank_entries() {
        let seeds = parse_seed_list("a:bc1qone, ,b:xpub6two,").unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[1].nickname, "b");
    }
}
