use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

/// Uppercase letters and digits minus the look-alikes I, O, 0 and 1.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

/// Source of human-shareable short codes.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Cheap shape check before hitting the store. Codes are case-sensitive,
/// so lowercase input never matches.
pub(crate) fn looks_like_code(code: &str) -> bool {
    lazy_static! {
        static ref CODE_RE: Regex = Regex::new(r"^[A-Z0-9]{6}$").unwrap();
    }
    CODE_RE.is_match(code)
}

/// Hands out a fixed list of codes, then repeats the last one.
#[cfg(test)]
pub struct ScriptedCodes(std::sync::Mutex<std::collections::VecDeque<String>>);

#[cfg(test)]
impl ScriptedCodes {
    pub fn new(codes: &[&str]) -> Self {
        Self(std::sync::Mutex::new(
            codes.iter().map(|c| c.to_string()).collect(),
        ))
    }
}

#[cfg(test)]
impl CodeSource for ScriptedCodes {
    fn next_code(&self) -> String {
        let mut q = self.0.lock().unwrap();
        if q.len() > 1 {
            q.pop_front().unwrap()
        } else {
            q.front().cloned().unwrap_or_default()
        }
    }
}
