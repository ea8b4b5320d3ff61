//! Installed event scripts, keyed by classifier and event number.

use caos_compiler::{Classifier, ParsedScript, Script};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct Scriptorium {
    scripts: BTreeMap<(Classifier, u16), Arc<Script>>,
}

impl Scriptorium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) one event script.
    pub fn insert(&mut self, classifier: Classifier, event: u16, script: Arc<Script>) {
        self.scripts.insert((classifier, event), script);
    }

    /// Install every `SCRP` block of a parsed file; returns how many.
    pub fn install(&mut self, parsed: &ParsedScript) -> usize {
        for event in &parsed.events {
            self.insert(event.classifier, event.event, Arc::clone(&event.script));
        }
        parsed.events.len()
    }

    pub fn remove(&mut self, classifier: Classifier, event: u16) -> Option<Arc<Script>> {
        self.scripts.remove(&(classifier, event))
    }

    /// Find the script for `event` on an agent of `classifier`, falling back
    /// from the exact species to genus, family and full wildcards.
    pub fn find(&self, classifier: Classifier, event: u16) -> Option<Arc<Script>> {
        let Classifier { family, genus, species } = classifier;
        [
            Classifier::new(family, genus, species),
            Classifier::new(family, genus, 0),
            Classifier::new(family, 0, 0),
            Classifier::new(0, 0, 0),
        ]
        .iter()
        .find_map(|key| self.scripts.get(&(*key, event)))
        .cloned()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scriptorium(src: &str) -> Scriptorium {
        let parsed = caos_compiler::parse("c3", src).unwrap();
        let mut s = Scriptorium::new();
        s.install(&parsed);
        s
    }

    #[test]
    fn test_exact_match_wins() {
        let s = scriptorium("scrp 3 2 1 9 setv va00 1 endm scrp 3 2 0 9 setv va00 2 endm");
        let exact = s.find(Classifier::new(3, 2, 1), 9).unwrap();
        let genus = s.find(Classifier::new(3, 2, 7), 9).unwrap();
        assert!(!Arc::ptr_eq(&exact, &genus));
    }

    #[test]
    fn test_wildcard_fallback() {
        let s = scriptorium("scrp 0 0 0 10 stop endm");
        assert!(s.find(Classifier::new(4, 4, 4), 10).is_some());
        assert!(s.find(Classifier::new(4, 4, 4), 9).is_none());
    }

    #[test]
    fn test_reinstall_replaces() {
        let mut s = scriptorium("scrp 1 1 1 1 stop endm");
        let parsed = caos_compiler::parse("c3", "scrp 1 1 1 1 setv va00 1 endm").unwrap();
        s.install(&parsed);
        assert_eq!(s.len(), 1);
    }
}
