//! Branches bundle an ordered chain of components behind a tee.

/// Mutable state for a branch component. Holds member names in add order;
/// the members themselves stay in the flat registry.
#[derive(Debug, Default)]
pub struct BranchSpec {
    pub components: Vec<String>,
}

impl BranchSpec {
    pub fn contains(&self, name: &str) -> bool {
        self.components.iter().any(|c| c == name)
    }

    pub fn add(&mut self, name: &str) {
        self.components.push(name.to_owned());
    }

    /// Remove a member. Returns false when `name` is not a member.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.components.len();
        self.components.retain(|c| c != name);
        self.components.len() != before
    }
}
