//! Case conversions applied to derived variables.

use serde::{Deserialize, Serialize};

/// Transformation applied to each value substituted into a derived variable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// `example mod` -> `ExampleMod`
    Pascal,
    /// `example mod` -> `exampleMod`
    Camel,
    /// `Example Mod` -> `example_mod`
    Snake,
    /// `Example Mod` -> `example-mod`
    Kebab,
    /// `com.example.mod` -> `com/example/mod`
    Path,
    Lower,
    Upper,
}

impl Transform {
    pub fn apply(self, value: &str) -> String {
        match self {
            Transform::Pascal => to_pascal_case(value),
            Transform::Camel => to_camel_case(value),
            Transform::Snake => to_snake_case(value),
            Transform::Kebab => to_kebab_case(value),
            Transform::Path => value.replace('.', "/"),
            Transform::Lower => value.to_lowercase(),
            Transform::Upper => value.to_uppercase(),
        }
    }
}

/// Split on separators and on lower-to-upper case boundaries.
fn words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Convert string to PascalCase. Letters after the first keep their case.
pub fn to_pascal_case(s: &str) -> String {
    words(s).iter().map(|w| capitalize(w)).collect()
}

/// Convert string to camelCase.
pub fn to_camel_case(s: &str) -> String {
    let pascal = to_pascal_case(s);
    let mut chars = pascal.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}

/// Convert string to snake_case.
pub fn to_snake_case(s: &str) -> String {
    words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Convert string to kebab-case.
pub fn to_kebab_case(s: &str) -> String {
    words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
