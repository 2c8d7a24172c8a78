/// SQL `LIKE` matching: `%` matches any run of characters, `_` exactly one.
pub fn like_match(pattern: &str, value: &str) -> bool {
    if pattern == "%" {
        return true;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    // position of the last `%` seen and the value index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, v));
                p += 1;
            }
            Some('_') => {
                p += 1;
                v += 1;
            }
            Some(c) if *c == value[v] => {
                p += 1;
                v += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    p = star + 1;
                    v = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_match_supports_percent() {
        assert!(like_match("%_link", "motorway_link"));
        assert!(like_match("Ma%", "Main Street"));
        assert!(like_match("%Street", "Main Street"));
        assert!(like_match("%in%", "Main Street"));
        assert!(!like_match("Ma%", "Elm Street"));
        assert!(like_match("%", ""));
    }

    #[test]
    fn like_match_supports_underscore() {
        assert!(like_match("M_in", "Main"));
        assert!(!like_match("M_in", "Maain"));
        assert!(like_match("a%b_c", "axxbyc"));
        assert!(!like_match("abc", "abcd"));
    }
}
