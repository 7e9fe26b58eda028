use anyhow::{Result, bail};

/// Longest object name the registry accepts.
const MAX_OBJECT_NAME_LEN: usize = 253;

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Turn arbitrary text (kernel executable names, pod names) into a valid
/// object name: lowercase `[a-z0-9.-]`, no leading/trailing separators,
/// at most 253 characters.
pub fn sanitize_object_name(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches(|c| c == '-' || c == '.');
    let mut name: String = trimmed.chars().take(MAX_OBJECT_NAME_LEN).collect();
    while name.ends_with('-') || name.ends_with('.') {
        name.pop();
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("default").is_ok());
        assert!(validate_name("dump-quota").is_ok());
        assert!(validate_name("team-123").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Dump-Quota").is_err());
        assert!(validate_name("dump_quota").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn sanitize_maps_invalid_characters() {
        assert_eq!(sanitize_object_name("coredump-My_App-web-0-1"), "coredump-my-app-web-0-1");
        assert_eq!(sanitize_object_name("__x.y__"), "x.y");
        assert_eq!(sanitize_object_name(&"a".repeat(300)).len(), 253);
    }
}
