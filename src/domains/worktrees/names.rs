use super::WorktreeError;
use std::collections::HashSet;

pub const ANIMALS: &[&str] = &[
    "aardvark", "albatross", "alpaca", "antelope", "armadillo", "badger", "barracuda", "beaver",
    "bison", "bobcat", "buffalo", "camel", "capybara", "caracal", "cheetah", "chinchilla",
    "cobra", "condor", "cougar", "coyote", "crane", "dingo", "dolphin", "eagle", "egret",
    "elk", "falcon", "ferret", "finch", "flamingo", "fox", "gazelle", "gecko", "gibbon",
    "giraffe", "gopher", "hawk", "hedgehog", "heron", "hyena", "ibex", "ibis", "iguana",
    "jackal", "jaguar", "kestrel", "kingfisher", "koala", "lemur", "leopard", "llama", "lynx",
    "magpie", "manatee", "marmot", "meerkat", "mink", "mongoose", "moose", "narwhal", "ocelot",
    "octopus", "orca", "osprey", "otter", "owl", "panda", "panther", "pelican", "penguin",
    "puffin", "puma", "quail", "raccoon", "raven", "reindeer", "salamander", "seal", "shark",
    "sparrow", "squirrel", "stork", "swan", "tapir", "tiger", "toucan", "turtle", "viper",
    "vulture", "walrus", "weasel", "wombat", "wolf", "yak", "zebra",
];

/// Picks a random name from `words` that is not in `excluded`.
/// `None` once every word is taken.
pub fn next_name_from(words: &[&str], excluded: &HashSet<String>) -> Option<String> {
    let available: Vec<&str> = words
        .iter()
        .copied()
        .filter(|word| !excluded.contains(*word))
        .collect();
    if available.is_empty() {
        return None;
    }
    let index = random_index(available.len());
    Some(available[index].to_string())
}

pub fn next_name(excluded: &HashSet<String>) -> Option<String> {
    next_name_from(ANIMALS, excluded)
}

fn random_index(len: usize) -> usize {
    match getrandom::u32() {
        Ok(value) => value as usize % len,
        Err(err) => {
            log::warn!("[WorktreeNames] System randomness unavailable ({err}); using first free name");
            0
        }
    }
}

/// A user-supplied name becomes a branch and a directory.
pub fn validate_name(name: &str, excluded: &HashSet<String>) -> Result<(), WorktreeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WorktreeError::InvalidName(
            "Worktree name can't be empty.".to_string(),
        ));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(WorktreeError::InvalidName(
            "Branch names can't contain spaces.".to_string(),
        ));
    }
    if excluded.contains(trimmed) {
        return Err(WorktreeError::NameTaken(trimmed.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn returns_the_only_remaining_name() {
        let (last, rest) = ANIMALS.split_last().unwrap();
        assert_eq!(next_name(&set(rest)).as_deref(), Some(*last));
    }

    #[test]
    fn exhausted_list_returns_none() {
        assert_eq!(next_name(&set(ANIMALS)), None);
        assert_eq!(next_name_from(&[], &HashSet::new()), None);
    }

    #[test]
    fn never_returns_an_excluded_name() {
        let excluded = set(&["otter", "heron", "badger"]);
        for _ in 0..200 {
            let name = next_name_from(&["otter", "heron", "badger", "lynx"], &excluded).unwrap();
            assert_eq!(name, "lynx");
        }
    }

    #[test]
    fn word_list_has_no_duplicates() {
        let unique: HashSet<&str> = ANIMALS.iter().copied().collect();
        assert_eq!(unique.len(), ANIMALS.len());
    }

    #[test]
    fn validation_rules() {
        let taken = set(&["otter"]);
        assert!(validate_name("lynx", &taken).is_ok());
        assert!(matches!(
            validate_name("  ", &taken),
            Err(WorktreeError::InvalidName(_))
        ));
        assert!(matches!(
            validate_name("two words", &taken),
            Err(WorktreeError::InvalidName(message)) if message.contains("spaces")
        ));
        assert!(matches!(
            validate_name("otter", &taken),
            Err(WorktreeError::NameTaken(name)) if name == "otter"
        ));
    }
}
