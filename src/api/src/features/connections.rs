//! Trainer and jockey lookups.
//!
//! Names are matched tolerant to initials and punctuation, so "W. P. Mullins"
//! and "Willie Mullins" resolve to the same entry.

/// Trainers with a standout strike rate.
pub const ELITE_TRAINERS: &[&str] = &[
    "W P Mullins",
    "Willie Mullins",
    "Gordon Elliott",
    "Nicky Henderson",
    "Paul Nicholls",
    "Dan Skelton",
    "Henry de Bromhead",
];

/// Elite trainers whose runners underperform on Heavy or Soft ground.
pub const TESTING_GROUND_UNDERPERFORMERS: &[&str] = &["Nicky Henderson", "Dan Skelton"];

/// Jockeys with a standout strike rate.
pub const ELITE_JOCKEYS: &[&str] = &[
    "Paul Townend",
    "Rachael Blackmore",
    "Harry Cobden",
    "Nico de Boinville",
    "Jack Kennedy",
    "Harry Skelton",
    "Sean Bowen",
    "Davy Russell",
    "Ryan Moore",
    "William Buick",
    "Oisin Murphy",
    "Frankie Dettori",
    "Tom Marquand",
    "Hollie Doyle",
];

/// Lower-case name tokens with punctuation, titles and bracketed suffixes removed.
fn tokens(name: &str) -> Vec<String> {
    let without_suffix = name.split('(').next().unwrap_or("");
    without_suffix
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| !matches!(*t, "mr" | "mrs" | "miss" | "ms"))
        .map(str::to_string)
        .collect()
}

/// Surname plus first initial, with particles like "de" folded into the surname.
fn name_key(tokens: &[String]) -> Option<(char, String)> {
    let first = tokens.first()?.chars().next()?;
    let surname_start = tokens
        .iter()
        .position(|t| matches!(t.as_str(), "de" | "du" | "van" | "von" | "o"))
        .filter(|&i| i > 0)
        .unwrap_or(tokens.len().saturating_sub(1));
    let surname = tokens[surname_start..].join(" ");
    Some((first, surname))
}

/// Whether two renderings of a name refer to the same person.
pub fn names_match(a: &str, b: &str) -> bool {
    let (ta, tb) = (tokens(a), tokens(b));
    if ta.is_empty() || tb.is_empty() {
        return false;
    }
    if ta == tb {
        return true;
    }
    match (name_key(&ta), name_key(&tb)) {
        (Some(ka), Some(kb)) => ka == kb,
        _ => false,
    }
}

fn in_list(name: &str, list: &[&str]) -> bool {
    list.iter().any(|entry| names_match(name, entry))
}

pub fn is_elite_trainer(name: &str) -> bool {
    in_list(name, ELITE_TRAINERS)
}

pub fn is_elite_jockey(name: &str) -> bool {
    in_list(name, ELITE_JOCKEYS)
}

pub fn underperforms_on_testing_ground(trainer: &str) -> bool {
    in_list(trainer, TESTING_GROUND_UNDERPERFORMERS)
}

/// Claiming allowance in pounds from a trailing "(3)" on the jockey name.
pub fn claiming_allowance(jockey: &str) -> u32 {
    let trimmed = jockey.trim_end();
    let Some(inner) = trimmed
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once('('))
        .map(|(_, inner)| inner.trim())
    else {
        return 0;
    };
    inner.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elite_trainer_initials() {
        assert!(is_elite_trainer("W. P. Mullins"));
        assert!(is_elite_trainer("Willie Mullins"));
        assert!(is_elite_trainer("Henry De Bromhead"));
        assert!(is_elite_trainer("H de Bromhead"));
        assert!(!is_elite_trainer("Emmet Mullins"));
        assert!(!is_elite_trainer(""));
    }

    #[test]
    fn test_elite_jockey_with_claim() {
        assert!(is_elite_jockey("P. Townend"));
        assert!(is_elite_jockey("J. W. Kennedy"));
        assert!(!is_elite_jockey("Danny Gilligan (5)"));
    }

    #[test]
    fn test_claiming_allowance() {
        assert_eq!(claiming_allowance("Danny Gilligan (5)"), 5);
        assert_eq!(claiming_allowance("Mr P. W. Mullins (7) "), 7);
        assert_eq!(claiming_allowance("Paul Townend"), 0);
        assert_eq!(claiming_allowance("Someone (IRE)"), 0);
    }

    #[test]
    fn test_underperformers_are_elite() {
        for trainer in TESTING_GROUND_UNDERPERFORMERS {
            assert!(is_elite_trainer(trainer));
        }
    }
}
