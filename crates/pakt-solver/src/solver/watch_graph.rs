use super::rule::{Literal, Rule};
use super::rule_set::RuleSet;

/// Two-watched-literals index for unit propagation.
///
/// Every non-assertion rule watches two of its literals; when a watched
/// literal is falsified the rule is revisited to find a replacement watch,
/// propagate a unit or report a conflict. Multi-conflict rules watch all of
/// their literals instead: installing any member immediately forbids the
/// rest.
#[derive(Debug, Default)]
pub struct WatchGraph {
    watches: Vec<Vec<WatchNode>>,
}

#[derive(Debug, Clone, Copy)]
struct WatchNode {
    rule_id: u32,
    other_watch: Literal,
}

impl WatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positive and negative literals of one id get distinct slots.
    fn index_of(literal: Literal) -> usize {
        let abs = literal.unsigned_abs() as usize;
        if literal > 0 {
            abs * 2
        } else {
            abs * 2 + 1
        }
    }

    fn watches_mut(&mut self, literal: Literal) -> &mut Vec<WatchNode> {
        let index = Self::index_of(literal);
        if index >= self.watches.len() {
            self.watches.resize(index + 1, Vec::new());
        }
        &mut self.watches[index]
    }

    pub fn from_rules(rules: &RuleSet) -> Self {
        let mut graph = Self::new();
        for rule in rules.iter() {
            if rule.is_disabled() || rule.is_assertion() {
                continue;
            }
            graph.add_rule(rule);
        }
        graph
    }

    pub fn add_rule(&mut self, rule: &Rule) {
        let literals = rule.literals();
        if literals.len() < 2 {
            return;
        }
        let rule_id = rule.id();

        if rule.is_multi_conflict() {
            let first = literals[0];
            for &literal in literals {
                self.watches_mut(literal).push(WatchNode {
                    rule_id,
                    other_watch: first,
                });
            }
            return;
        }

        let (watch_a, watch_b) = (literals[0], literals[1]);
        self.watches_mut(watch_a).push(WatchNode {
            rule_id,
            other_watch: watch_b,
        });
        self.watches_mut(watch_b).push(WatchNode {
            rule_id,
            other_watch: watch_a,
        });
    }

    fn get_watches(&self, literal: Literal) -> &[WatchNode] {
        let index = Self::index_of(literal);
        self.watches.get(index).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn remove_watch(&mut self, literal: Literal, rule_id: u32) {
        let index = Self::index_of(literal);
        if let Some(watches) = self.watches.get_mut(index) {
            watches.retain(|w| w.rule_id != rule_id);
        }
    }

    fn move_watch(&mut self, rule_id: u32, from: Literal, to: Literal, other: Literal) {
        self.remove_watch(from, rule_id);
        self.watches_mut(to).push(WatchNode {
            rule_id,
            other_watch: other,
        });
    }
}

/// Outcome of revisiting a single watching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagateResult {
    /// A literal that must now be asserted, with the rule forcing it.
    Unit(Literal, u32),
    /// All literals of the rule are false.
    Conflict(u32),
}

/// Runs unit propagation over the watch graph.
pub struct Propagator<'a> {
    graph: &'a mut WatchGraph,
    rules: &'a RuleSet,
}

impl<'a> Propagator<'a> {
    pub fn new(graph: &'a mut WatchGraph, rules: &'a RuleSet) -> Self {
        Self { graph, rules }
    }

    /// Process the fallout of `literal` having been asserted. The callback
    /// reports the truth of a literal under the current assignment, `None`
    /// meaning undecided.
    pub fn propagate<F>(&mut self, literal: Literal, mut truth: F) -> Vec<PropagateResult>
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        let mut results = Vec::new();

        // Asserting `literal` falsifies its negation; visit the rules
        // watching that now-false literal.
        let false_literal = -literal;
        let watches: Vec<WatchNode> = self.graph.get_watches(false_literal).to_vec();

        for watch in watches {
            let Some(rule) = self.rules.get(watch.rule_id) else {
                continue;
            };
            if rule.is_disabled() {
                continue;
            }

            if rule.is_multi_conflict() {
                if let Some(conflict) =
                    multi_conflict_units(rule, false_literal, &mut truth, &mut results)
                {
                    results.push(conflict);
                }
                continue;
            }

            match truth(watch.other_watch) {
                Some(true) => {}
                Some(false) => {
                    if let Some(result) =
                        self.find_new_watch(rule, false_literal, watch.other_watch, &mut truth)
                    {
                        results.push(result);
                    }
                }
                None => {
                    if let Some(result) =
                        self.check_unit(rule, false_literal, watch.other_watch, &mut truth)
                    {
                        results.push(result);
                    }
                }
            }
        }

        results
    }

    /// Both watched literals are false: look for a replacement watch or
    /// report a conflict.
    fn find_new_watch<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        other_false: Literal,
        truth: &mut F,
    ) -> Option<PropagateResult>
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &literal in rule.literals() {
            if literal == false_literal || literal == other_false {
                continue;
            }
            match truth(literal) {
                Some(false) => continue,
                // True or undecided: watch it instead.
                _ => {
                    self.graph
                        .move_watch(rule.id(), false_literal, literal, other_false);
                    return None;
                }
            }
        }
        Some(PropagateResult::Conflict(rule.id()))
    }

    /// One watched literal false, the other undecided: unit-propagate the
    /// undecided one unless another non-false literal can take the watch.
    fn check_unit<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        undecided: Literal,
        truth: &mut F,
    ) -> Option<PropagateResult>
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &literal in rule.literals() {
            if literal == false_literal || literal == undecided {
                continue;
            }
            match truth(literal) {
                Some(false) => continue,
                _ => {
                    self.graph
                        .move_watch(rule.id(), false_literal, literal, undecided);
                    return None;
                }
            }
        }
        Some(PropagateResult::Unit(undecided, rule.id()))
    }
}

/// Installing a member of a multi-conflict rule forbids all other members.
fn multi_conflict_units<F>(
    rule: &Rule,
    false_literal: Literal,
    truth: &mut F,
    results: &mut Vec<PropagateResult>,
) -> Option<PropagateResult>
where
    F: FnMut(Literal) -> Option<bool>,
{
    for &literal in rule.literals() {
        if literal == false_literal {
            continue;
        }
        match truth(literal) {
            Some(true) => {}
            Some(false) => return Some(PropagateResult::Conflict(rule.id())),
            None => results.push(PropagateResult::Unit(literal, rule.id())),
        }
    }
    None
}
