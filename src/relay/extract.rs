/// Which kind of JSON value to look for in a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    Object,
    Array,
}

impl Bracket {
    fn open(self) -> char {
        match self {
            Bracket::Object => '{',
            Bracket::Array => '[',
        }
    }
}

/// Returns the first balanced JSON object or array embedded in `text`.
///
/// Scanning starts at the first opening bracket of the requested kind and
/// stops where its matching closer is found. Brackets inside JSON strings
/// (including escaped quotes) are ignored, so nested example objects or
/// braces in string values do not cut the payload short. Returns `None` when
/// there is no opening bracket or the brackets never balance.
pub fn extract_json(text: &str, bracket: Bracket) -> Option<&str> {
    let start = text.find(bracket.open())?;
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}
