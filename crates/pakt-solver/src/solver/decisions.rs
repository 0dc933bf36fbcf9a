use super::pool::PackageId;
use super::rule::Literal;

/// Assignment state of every candidate during search.
///
/// A flat map indexed by candidate id encodes decision and level in one
/// value: 0 is undecided, `level + 1` means installed at `level`,
/// `-(level + 1)` means not installed at `level`. The queue keeps decisions
/// in the order they were made, each with the rule that forced it (decisions
/// proper have no rule).
#[derive(Debug, Default)]
pub struct Decisions {
    decision_map: Vec<i32>,
    queue: Vec<(Literal, Option<u32>)>,
    level: u32,
}

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn slot(&self, package_id: PackageId) -> i32 {
        let index = package_id as usize;
        if index < self.decision_map.len() {
            self.decision_map[index]
        } else {
            0
        }
    }

    #[inline]
    fn ensure_capacity(&mut self, package_id: PackageId) {
        let index = package_id as usize;
        if index >= self.decision_map.len() {
            self.decision_map.resize(index + 1, 0);
        }
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[inline]
    pub fn increment_level(&mut self) {
        self.level += 1;
    }

    /// Record an assignment at the current level. Returns false when it
    /// contradicts an existing assignment.
    pub fn decide(&mut self, literal: Literal, rule_id: Option<u32>) -> bool {
        let package_id = literal.unsigned_abs() as PackageId;
        self.ensure_capacity(package_id);

        let existing = self.decision_map[package_id as usize];
        if existing != 0 {
            return (existing > 0) == (literal > 0);
        }

        let encoded = (self.level + 1) as i32;
        self.decision_map[package_id as usize] = if literal > 0 { encoded } else { -encoded };
        self.queue.push((literal, rule_id));
        true
    }

    /// Whether the literal holds under the current assignment.
    #[inline]
    pub fn satisfied(&self, literal: Literal) -> bool {
        let decision = self.slot(literal.unsigned_abs() as PackageId);
        decision != 0 && (decision > 0) == (literal > 0)
    }

    /// Whether the literal contradicts the current assignment.
    #[inline]
    pub fn conflict(&self, literal: Literal) -> bool {
        let decision = self.slot(literal.unsigned_abs() as PackageId);
        decision != 0 && (decision > 0) != (literal > 0)
    }

    #[inline]
    pub fn decided(&self, package_id: PackageId) -> bool {
        self.slot(package_id) != 0
    }

    #[inline]
    pub fn undecided(&self, package_id: PackageId) -> bool {
        !self.decided(package_id)
    }

    #[inline]
    pub fn decided_install(&self, package_id: PackageId) -> bool {
        self.slot(package_id) > 0
    }

    /// The level a candidate was assigned at, if any.
    pub fn decision_level(&self, literal: Literal) -> Option<u32> {
        let decision = self.slot(literal.unsigned_abs() as PackageId);
        if decision == 0 {
            None
        } else {
            Some(decision.unsigned_abs() - 1)
        }
    }

    /// The rule that forced a candidate's assignment, if it was propagated.
    pub fn decision_rule(&self, literal: Literal) -> Option<u32> {
        let package_id = literal.unsigned_abs() as PackageId;
        self.queue
            .iter()
            .find(|(lit, _)| lit.unsigned_abs() as PackageId == package_id)
            .and_then(|(_, rule_id)| *rule_id)
    }

    /// Undo every assignment made above `target_level`.
    pub fn revert_to_level(&mut self, target_level: u32) {
        let threshold = (target_level + 1) as i32;
        for decision in &mut self.decision_map {
            if decision.unsigned_abs() as i32 > threshold {
                *decision = 0;
            }
        }

        let decision_map = &self.decision_map;
        self.queue.retain(|(literal, _)| {
            let index = literal.unsigned_abs() as usize;
            index < decision_map.len() && decision_map[index] != 0
        });

        self.level = target_level;
    }

    /// Candidates assigned true, in id order.
    pub fn installed_packages(&self) -> impl Iterator<Item = PackageId> + '_ {
        self.decision_map
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(id, _)| id as PackageId)
    }

    pub fn queue(&self) -> &[(Literal, Option<u32>)] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
