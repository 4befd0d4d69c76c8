/// Expand `${VAR}` placeholders from the process environment.
///
/// Unknown variables and unterminated placeholders are kept verbatim.
pub fn substitute_env(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

pub(crate) fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match lookup(name).filter(|_| !name.is_empty()) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
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
            "BOT_USERNAME" => Some("ConsultaBot".into()),
            "TELEGRAM_API_ID" => Some("12345".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variables() {
        assert_eq!(
            expand_with("bot_username = \"${BOT_USERNAME}\"\napi_id = ${TELEGRAM_API_ID}", lookup),
            "bot_username = \"ConsultaBot\"\napi_id = 12345"
        );
    }

    #[test]
    fn keeps_unknown_and_empty_placeholders() {
        assert_eq!(expand_with("x=${NOPE} y=${}", lookup), "x=${NOPE} y=${}");
    }

    #[test]
    fn keeps_unterminated_placeholder() {
        assert_eq!(expand_with("a ${BOT_USERNAME", lookup), "a ${BOT_USERNAME");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(substitute_env("temp_dir = \"Data/temp_files\""), "temp_dir = \"Data/temp_files\"");
    }
}
