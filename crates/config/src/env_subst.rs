/// Expand `${VAR}` and `${VAR:-fallback}` placeholders in raw config text.
///
/// Unset variables without a fallback are left untouched so the parser
/// reports them in context.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: emit the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(body);
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

    fn env(name: &str) -> Option<String> {
        match name {
            "FIXGATE_QUEUE" => Some("256".into()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn replaces_known_var() {
        assert_eq!(
            substitute_with("queue_capacity = ${FIXGATE_QUEUE}", env),
            "queue_capacity = 256"
        );
    }

    #[test]
    fn keeps_unknown_var() {
        assert_eq!(substitute_with("${NOPE}", env), "${NOPE}");
    }

    #[test]
    fn uses_fallback_only_when_unset() {
        assert_eq!(substitute_with("${NOPE:-5000}", env), "5000");
        assert_eq!(substitute_with("${FIXGATE_QUEUE:-1}", env), "256");
        assert_eq!(substitute_with("[${EMPTY:-x}]", env), "[]");
    }

    #[test]
    fn unterminated_is_literal() {
        assert_eq!(substitute_with("a ${FIXGATE_QUEUE", env), "a ${FIXGATE_QUEUE");
    }

    #[test]
    fn unset_process_var_is_left_alone() {
        assert_eq!(
            substitute_env("${FIXGATE_SURELY_UNSET_VAR_9F2}"),
            "${FIXGATE_SURELY_UNSET_VAR_9F2}"
        );
    }
}
