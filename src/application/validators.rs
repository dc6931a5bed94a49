use validator::ValidateEmail;

/// Validates that the input looks like a valid email address
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.validate_email()
}

/// Validates a plan slug for URL-friendly characters.
/// Rules:
/// - 1-64 characters
/// - Only lowercase ASCII letters, numbers, hyphens, underscores
/// - Must start with a letter or number
pub fn is_valid_plan_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.len() > 64 {
        return false;
    }

    let Some(first) = slug.chars().next() else {
        return false;
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    slug.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// ISO-4217 style code, lowercase (e.g. "usd").
pub fn is_valid_currency(currency: &str) -> bool {
    currency.len() == 3 && currency.chars().all(|c| c.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("billing@example.com"));
        assert!(is_valid_email("user+tag@example.org"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("   "));
        assert!(!is_valid_email("notanemail"));
        assert!(!is_valid_email("@nodomain.com"));
    }

    #[test]
    fn test_valid_plan_slugs() {
        assert!(is_valid_plan_slug("pro"));
        assert!(is_valid_plan_slug("pro-annual"));
        assert!(is_valid_plan_slug("extra_seats"));
        assert!(is_valid_plan_slug("2024-launch"));
        assert!(is_valid_plan_slug(&"a".repeat(64)));
    }

    #[test]
    fn test_invalid_plan_slugs() {
        assert!(!is_valid_plan_slug(""));
        assert!(!is_valid_plan_slug(&"a".repeat(65)));
        assert!(!is_valid_plan_slug("-pro"));
        assert!(!is_valid_plan_slug("Pro"));
        assert!(!is_valid_plan_slug("pro plan"));
        assert!(!is_valid_plan_slug("plän"));
    }

    #[test]
    fn test_currency_codes() {
        assert!(is_valid_currency("usd"));
        assert!(is_valid_currency("eur"));
        assert!(!is_valid_currency("USD"));
        assert!(!is_valid_currency("us"));
        assert!(!is_valid_currency("usdd"));
    }
}
