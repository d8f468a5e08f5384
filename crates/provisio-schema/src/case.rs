//! Identifier case conversion between manifest keys and engine variable names.

/// Convert `lowerCamel`/`UpperCamel` keys to `snake_case`.
///
/// Acronym runs stay together (`HTTPServer` becomes `http_server`), hyphens
/// and spaces become underscores, and any other character is kept, so map
/// keys such as `app.kubernetes.io/name` survive unchanged apart from case.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            if !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a `snake_case` field name to its `lowerCamel` JSON name.
pub fn to_lower_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for c in s.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_from_camel() {
        assert_eq!(to_snake_case("apiVersion"), "api_version");
        assert_eq!(to_snake_case("awsProviderConfig"), "aws_provider_config");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("diskSizeGb"), "disk_size_gb");
        assert_eq!(to_snake_case("ipv4Cidr"), "ipv4_cidr");
    }

    #[test]
    fn snake_is_idempotent() {
        for key in ["health_check", "spec", "node_pool_count", "ipv4_cidr"] {
            assert_eq!(to_snake_case(key), key);
        }
    }

    #[test]
    fn snake_keeps_punctuation_in_map_keys() {
        assert_eq!(to_snake_case("app.kubernetes.io/name"), "app.kubernetes.io/name");
        assert_eq!(to_snake_case("cost-center"), "cost_center");
    }

    #[test]
    fn camel_from_snake() {
        assert_eq!(to_lower_camel("health_check"), "healthCheck");
        assert_eq!(to_lower_camel("is_persistence_enabled"), "isPersistenceEnabled");
        assert_eq!(to_lower_camel("spec"), "spec");
        assert_eq!(to_lower_camel("_private"), "private");
    }
}
