use std::collections::BTreeMap;

/// Parses flat `key=value` property text as written by external installers.
/// `:` is accepted as a separator, `#` and `!` start comment lines.
pub(crate) fn parse(text: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line
            .char_indices()
            .find(|(_, c)| *c == '=' || *c == ':')
            .map(|(i, _)| i);
        let Some(at) = split else {
            continue;
        };
        let key = line[..at].trim();
        let value = line[at + 1..].trim();
        if !key.is_empty() {
            props.insert(key.to_string(), value.to_string());
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_keys_values_and_comments() {
        let text = "# comment\npath=r /opt/extra\n! another\nid : com.example\n\nbroken line\n";
        let props = parse(text);
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("path").map(String::as_str), Some("r /opt/extra"));
        assert_eq!(props.get("id").map(String::as_str), Some("com.example"));
    }
}
