/// Masks a secret for logs, keeping a short prefix for correlation.
pub(crate) fn redact(input: &str) -> String {
    if input.chars().count() <= 4 {
        "****".to_string()
    } else {
        let prefix: String = input.chars().take(4).collect();
        format!("{prefix}***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secrets_are_fully_masked() {
        assert_eq!(redact("abc"), "****");
        assert_eq!(redact(""), "****");
    }

    #[test]
    fn long_secrets_keep_prefix() {
        assert_eq!(redact("sk-1234567890"), "sk-1***");
    }
}
