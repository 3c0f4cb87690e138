/// Expand `${NAME}` and `${NAME:-fallback}` in raw config text.
///
/// Unknown variables without a fallback stay verbatim so the parser reports
/// them in context.
pub fn substitute_env(input: &str) -> String {
    expand(input, |name| std::env::var(name).ok())
}

fn expand(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the tail untouched.
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(expr);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "GRAPHPUSH_TEST_PORT" => Some("9000".into()),
            _ => None,
        }
    }

    #[test]
    fn replaces_known_variable() {
        assert_eq!(expand("port = ${GRAPHPUSH_TEST_PORT}", lookup), "port = 9000");
    }

    #[test]
    fn uses_fallback_for_unknown_variable() {
        assert_eq!(
            expand("bind = \"${GRAPHPUSH_NOPE:-0.0.0.0}\"", lookup),
            "bind = \"0.0.0.0\""
        );
    }

    #[test]
    fn keeps_unknown_variable_without_fallback() {
        assert_eq!(expand("${GRAPHPUSH_NOPE}", lookup), "${GRAPHPUSH_NOPE}");
    }

    #[test]
    fn keeps_unterminated_placeholder() {
        assert_eq!(expand("a ${B", lookup), "a ${B");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
