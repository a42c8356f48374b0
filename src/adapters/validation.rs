use crate::ports::FieldValidator;

/// Syntactic validator for contact and catalog fields
///
/// Only checks shape. It never tells whether an address can receive mail
/// or whether a number is reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatValidator;

impl FormatValidator {
    pub fn new() -> Self {
        Self
    }
}

impl FieldValidator for FormatValidator {
    /// `local@domain.tld` with no whitespace and a dot inside the domain
    fn is_valid_email(&self, email: &str) -> bool {
        let email = email.trim();
        if email.chars().any(char::is_whitespace) {
            return false;
        }

        let Some((local, domain)) = email.split_once('@') else {
            return false;
        };
        if local.is_empty() || domain.contains('@') {
            return false;
        }

        match domain.rsplit_once('.') {
            Some((name, tld)) => {
                !name.is_empty()
                    && !name.starts_with('.')
                    && !name.ends_with('.')
                    && !name.contains("..")
                    && tld.len() >= 2
                    && tld.chars().all(|c| c.is_ascii_alphabetic())
            }
            None => false,
        }
    }

    /// 10 to 15 digits once spaces, dashes, dots and parentheses are removed.
    /// A single leading `+` is allowed.
    fn is_valid_phone(&self, phone: &str) -> bool {
        let phone = phone.trim();
        let phone = phone.strip_prefix('+').unwrap_or(phone);

        let mut digits = 0;
        for c in phone.chars() {
            match c {
                '0'..='9' => digits += 1,
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return false,
            }
        }
        (10..=15).contains(&digits)
    }

    /// ISBN-10 or ISBN-13 with a valid check digit; hyphens and spaces are ignored
    fn is_valid_isbn(&self, isbn: &str) -> bool {
        let compact: Vec<char> = isbn
            .chars()
            .filter(|c| *c != '-' && *c != ' ')
            .collect();

        match compact.len() {
            10 => is_valid_isbn10(&compact),
            13 => is_valid_isbn13(&compact),
            _ => false,
        }
    }
}

fn is_valid_isbn10(chars: &[char]) -> bool {
    let mut sum = 0;
    for (i, c) in chars.iter().enumerate() {
        let value = match (i, c) {
            (9, 'X' | 'x') => 10,
            (_, c) => match c.to_digit(10) {
                Some(d) => d,
                None => return false,
            },
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn is_valid_isbn13(chars: &[char]) -> bool {
    let mut sum = 0;
    for (i, c) in chars.iter().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { d } else { d * 3 };
    }
    sum % 10 == 0
}
