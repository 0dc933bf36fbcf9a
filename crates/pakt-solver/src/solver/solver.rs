use std::sync::Arc;

use crate::error::SolverError;
use crate::package::{AliasPackage, Package};
use crate::platform::PlatformRequirementFilter;

use super::decisions::Decisions;
use super::policy::Policy;
use super::pool::{PackageId, Pool, PoolEntry};
use super::pool_optimizer::PoolOptimizer;
use super::problem::{Problem, ProblemSet};
use super::request::Request;
use super::rule::{Literal, Rule, RuleKind};
use super::rule_generator::RuleGenerator;
use super::rule_set::RuleSet;
use super::watch_graph::{PropagateResult, Propagator, WatchGraph};

/// Callback polled at the top of every search iteration; returning true
/// aborts the solve.
pub type AbortChecker = Box<dyn Fn() -> bool + Send + Sync>;

/// Counters describing one search run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverStats {
    pub decisions: u64,
    pub conflicts: u64,
    pub learned_rules: u64,
    /// Set when conflict analysis ever asserted a positive literal, i.e. the
    /// learned clause flipped an earlier do-not-install decision into an
    /// install.
    pub learned_positive_literal: bool,
}

/// What the search decided: the packages to end up installed, the alias
/// versions to mark, and the run's statistics.
#[derive(Debug, Clone, Default)]
pub struct SolverResult {
    pub packages: Vec<Arc<Package>>,
    pub aliases: Vec<Arc<AliasPackage>>,
    pub stats: SolverStats,
}

/// The CDCL search over the pool's rule set.
///
/// The loop is: propagate the consequences of all assignments; on conflict,
/// derive a learned clause at the first unique implication point, jump back
/// and continue; otherwise pick the next unresolved requirement, let the
/// policy order its candidates and decide the best one. A full assignment
/// is a model.
pub struct Solver<'a> {
    pool: &'a Pool,
    policy: &'a Policy,
    platform_filter: PlatformRequirementFilter,
    optimize_pool: bool,
    should_abort: Option<AbortChecker>,
}

impl<'a> Solver<'a> {
    pub fn new(pool: &'a Pool, policy: &'a Policy) -> Self {
        Self {
            pool,
            policy,
            platform_filter: PlatformRequirementFilter::No,
            optimize_pool: false,
            should_abort: None,
        }
    }

    /// Enable the pre-solve pool pruning pass.
    pub fn with_optimization(mut self, optimize: bool) -> Self {
        self.optimize_pool = optimize;
        self
    }

    pub fn with_platform_filter(mut self, filter: PlatformRequirementFilter) -> Self {
        self.platform_filter = filter;
        self
    }

    /// Install a cooperative cancellation probe.
    pub fn with_abort_checker(mut self, checker: AbortChecker) -> Self {
        self.should_abort = Some(checker);
        self
    }

    pub fn solve(&self, request: &Request) -> Result<SolverResult, SolverError> {
        if self.optimize_pool {
            let mut optimizer = PoolOptimizer::new(self.policy);
            let optimized = optimizer.optimize(request, self.pool);
            self.solve_with_pool(&optimized, request)
        } else {
            self.solve_with_pool(self.pool, request)
        }
    }

    fn solve_with_pool(&self, pool: &Pool, request: &Request) -> Result<SolverResult, SolverError> {
        log::debug!("Generating rules for {} pool candidates", pool.len());

        let generator = RuleGenerator::new(pool, self.platform_filter.clone());
        let rules = generator.generate(request);
        log::info!("Generated {} rules", rules.len());

        let mut state = SolverState::new(rules);

        self.process_assertions(&mut state, pool)?;
        self.run_sat(&mut state, pool)?;

        log::info!(
            "Resolved {} candidates with {} decisions, {} conflicts, {} learned rules",
            pool.len(),
            state.stats.decisions,
            state.stats.conflicts,
            state.stats.learned_rules
        );

        Ok(self.build_result(&state, pool, request))
    }

    /// Apply unit rules before search; an empty or contradictory unit rule
    /// is unsolvable outright.
    fn process_assertions(&self, state: &mut SolverState, pool: &Pool) -> Result<(), SolverError> {
        state.decisions.increment_level();

        for rule in state.rules.iter() {
            if rule.is_disabled() || !rule.is_empty() {
                continue;
            }
            // An empty root requirement means nothing matched it at all.
            if rule.kind() == RuleKind::RootRequire {
                if let Some(link) = rule.reason() {
                    if crate::platform::is_platform_package(&link.target) {
                        return Err(SolverError::PlatformRequirementFailure {
                            name: link.target.clone(),
                            reason: format!(
                                "{} {} is missing from your platform; install or enable it, \
                                 or ignore the requirement with the platform requirement filter",
                                link.target,
                                link.pretty_constraint()
                            ),
                        });
                    }
                    return Err(SolverError::RequirementNotFound {
                        name: link.target.clone(),
                        constraint: link.pretty_constraint().to_string(),
                    });
                }
            }
            let mut problem = Problem::new();
            problem.add_rule(rule, pool);
            let mut problems = ProblemSet::new();
            problems.add(problem);
            return Err(SolverError::VersionConflict(problems));
        }

        let mut assertions: Vec<(Literal, u32, RuleKind)> = Vec::new();
        for rule in state.rules.assertions() {
            if !rule.is_disabled() {
                assertions.push((rule.literals()[0], rule.id(), rule.kind()));
            }
        }

        for (literal, rule_id, kind) in assertions {
            if state.decisions.conflict(literal) {
                // Two unit rules fight over one candidate.
                if kind == RuleKind::Fixed {
                    if let Some(name) = pool.name_of(literal.unsigned_abs() as PackageId) {
                        return Err(SolverError::FixedConflict {
                            name: name.to_string(),
                        });
                    }
                }
                let mut problem = Problem::new();
                if let Some(rule) = state.rules.get(rule_id) {
                    problem.add_rule(rule, pool);
                }
                if let Some(other_id) = state.decisions.decision_rule(literal) {
                    if let Some(other) = state.rules.get(other_id) {
                        problem.add_rule(other, pool);
                    }
                }
                let mut problems = ProblemSet::new();
                problems.add(problem);
                return Err(SolverError::VersionConflict(problems));
            }

            if !state.decisions.satisfied(literal) {
                state.decisions.decide(literal, Some(rule_id));
            }
        }

        Ok(())
    }

    fn run_sat(&self, state: &mut SolverState, pool: &Pool) -> Result<(), SolverError> {
        let mut iterations = 0u32;
        const MAX_ITERATIONS: u32 = 100_000;

        loop {
            if let Some(should_abort) = &self.should_abort {
                if should_abort() {
                    return Err(SolverError::Aborted);
                }
            }

            iterations += 1;
            if iterations > MAX_ITERATIONS {
                let mut problems = ProblemSet::new();
                problems.add(Problem::new().with_message("Search exceeded the iteration limit"));
                return Err(SolverError::VersionConflict(problems));
            }

            if let Err(conflict_rule) = self.propagate(state) {
                state.stats.conflicts += 1;
                if state.decisions.level() == 1 {
                    return Err(self.unsolvable(state, pool, conflict_rule));
                }
                self.analyze_and_backjump(state, pool, conflict_rule)?;
                continue;
            }

            match self.select_next(state) {
                Some((candidates, name)) => {
                    self.decide_next(state, pool, &candidates, &name)?;
                }
                // Every reachable requirement is resolved; the assignment is
                // a model.
                None => return Ok(()),
            }
        }
    }

    /// Unit propagation over everything asserted since the last call.
    fn propagate(&self, state: &mut SolverState) -> Result<(), u32> {
        while state.propagate_index < state.decisions.len() {
            let (literal, _) = state.decisions.queue()[state.propagate_index];
            state.propagate_index += 1;

            let results = {
                let decisions = &state.decisions;
                let truth = |lit: Literal| -> Option<bool> {
                    if decisions.decided(lit.unsigned_abs() as PackageId) {
                        Some(decisions.satisfied(lit))
                    } else {
                        None
                    }
                };
                let mut propagator = Propagator::new(&mut state.watch_graph, &state.rules);
                propagator.propagate(literal, truth)
            };

            for result in results {
                match result {
                    PropagateResult::Unit(unit, rule_id) => {
                        if state.decisions.conflict(unit) {
                            return Err(rule_id);
                        }
                        if !state.decisions.satisfied(unit) {
                            state.decisions.decide(unit, Some(rule_id));
                        }
                    }
                    PropagateResult::Conflict(rule_id) => {
                        return Err(rule_id);
                    }
                }
            }
        }

        Ok(())
    }

    /// The next unresolved requirement to branch on.
    ///
    /// Rules are scanned circularly, resuming after the last rule a decision
    /// was made for; a freshly decided subgraph is explored before the scan
    /// wraps back to earlier requirements.
    fn select_next(&self, state: &mut SolverState) -> Option<(Vec<PackageId>, String)> {
        let rules = state.rules.as_slice();
        let count = rules.len();

        for step in 0..count {
            let index = (state.rule_cursor + step) % count;
            let rule = &rules[index];
            if rule.is_disabled() {
                continue;
            }
            let literals = rule.literals();

            let found = match rule.kind() {
                RuleKind::RootRequire => {
                    let mut candidates = Vec::new();
                    let mut satisfied = false;
                    for &literal in literals {
                        if state.decisions.satisfied(literal) {
                            satisfied = true;
                            break;
                        }
                        if literal > 0 && state.decisions.undecided(literal as PackageId) {
                            candidates.push(literal as PackageId);
                        }
                    }
                    if !satisfied && !candidates.is_empty() {
                        Some(candidates)
                    } else {
                        None
                    }
                }
                RuleKind::PackageRequires => {
                    let Some((&source_literal, targets)) = literals.split_first() else {
                        continue;
                    };
                    if source_literal >= 0 {
                        continue;
                    }
                    // The rule only binds once its source is installed.
                    if !state
                        .decisions
                        .decided_install(-source_literal as PackageId)
                    {
                        continue;
                    }

                    let mut candidates = Vec::new();
                    for &literal in targets {
                        if literal > 0 {
                            if state.decisions.satisfied(literal) {
                                candidates.clear();
                                break;
                            }
                            if state.decisions.undecided(literal as PackageId) {
                                candidates.push(literal as PackageId);
                            }
                        }
                    }
                    if candidates.is_empty() {
                        None
                    } else {
                        Some(candidates)
                    }
                }
                _ => None,
            };

            if let Some(candidates) = found {
                let name = rule
                    .reason()
                    .map(|link| link.target.clone())
                    .unwrap_or_default();
                state.rule_cursor = index + 1;
                return Some((candidates, name));
            }
        }

        None
    }

    /// Pick the policy's best candidate for a requirement and assert it at a
    /// new decision level.
    fn decide_next(
        &self,
        state: &mut SolverState,
        pool: &Pool,
        candidates: &[PackageId],
        name: &str,
    ) -> Result<(), SolverError> {
        let sorted = self
            .policy
            .select_preferred_for_requirement(pool, candidates, Some(name));
        let Some(&selected) = sorted.first() else {
            return Ok(());
        };

        state.decisions.increment_level();
        state.decisions.decide(selected, None);
        state.stats.decisions += 1;

        self.propagate_to_fixpoint(state, pool)
    }

    /// Propagate until quiet, analyzing and backjumping over any conflicts.
    fn propagate_to_fixpoint(&self, state: &mut SolverState, pool: &Pool) -> Result<(), SolverError> {
        loop {
            match self.propagate(state) {
                Ok(()) => return Ok(()),
                Err(conflict_rule) => {
                    state.stats.conflicts += 1;
                    if state.decisions.level() == 1 {
                        return Err(self.unsolvable(state, pool, conflict_rule));
                    }
                    self.analyze_and_backjump(state, pool, conflict_rule)?;
                }
            }
        }
    }

    /// Learn from a conflict and jump back.
    fn analyze_and_backjump(
        &self,
        state: &mut SolverState,
        pool: &Pool,
        conflict_rule: u32,
    ) -> Result<(), SolverError> {
        let (learned_literal, backjump_level, learned_literals) =
            self.analyze_conflict(state, conflict_rule);

        if backjump_level == 0 || backjump_level >= state.decisions.level() {
            return Err(self.unsolvable(state, pool, conflict_rule));
        }

        state.decisions.revert_to_level(backjump_level);
        state.reset_propagate_index();

        if !learned_literals.is_empty() {
            let learned_id = state.rules.add(Rule::learned(learned_literals));
            if let Some(rule) = state.rules.get(learned_id) {
                state.watch_graph.add_rule(rule);
            }
            state.stats.learned_rules += 1;

            // A positive learned literal flips an earlier do-not-install
            // into an install; both polarities assert the same way.
            if learned_literal > 0 {
                state.stats.learned_positive_literal = true;
            }
            state.decisions.decide(learned_literal, Some(learned_id));
        }

        Ok(())
    }

    /// First-UIP conflict analysis: walk the implication graph backwards
    /// from the conflicting rule, resolving on assignments of the current
    /// level until exactly one remains. Returns the literal to assert, the
    /// level to jump back to and the learned clause.
    fn analyze_conflict(
        &self,
        state: &SolverState,
        conflict_rule: u32,
    ) -> (Literal, u32, Vec<Literal>) {
        let current_level = state.decisions.level();
        let queue = state.decisions.queue();

        let mut seen: std::collections::HashSet<PackageId> = std::collections::HashSet::new();
        let mut open_at_current_level = 0usize;
        let mut other_literals: Vec<Literal> = Vec::new();
        let mut backjump_level = 0u32;
        let mut learned_literal: Option<Literal> = None;

        let mut queue_index = queue.len();
        let mut current_rule = state.rules.get(conflict_rule);

        loop {
            if let Some(rule) = current_rule {
                for &literal in rule.literals() {
                    let package_id = literal.unsigned_abs() as PackageId;
                    if seen.contains(&package_id) || state.decisions.satisfied(literal) {
                        continue;
                    }
                    seen.insert(package_id);

                    match state.decisions.decision_level(literal) {
                        Some(level) if level == current_level => open_at_current_level += 1,
                        Some(level) if level > 1 => {
                            other_literals.push(literal);
                            backjump_level = backjump_level.max(level);
                        }
                        _ => {}
                    }
                }
            }

            if open_at_current_level == 0 {
                break;
            }

            // Walk back to the most recent assignment involved in the
            // conflict and resolve on its reason.
            let mut resolved = false;
            while queue_index > 0 {
                queue_index -= 1;
                let (literal, _) = queue[queue_index];
                let package_id = literal.unsigned_abs() as PackageId;

                if !seen.remove(&package_id) {
                    continue;
                }

                open_at_current_level -= 1;
                if open_at_current_level == 0 {
                    // The unique implication point; assert its negation.
                    learned_literal = Some(-literal);
                } else {
                    current_rule = state
                        .decisions
                        .decision_rule(literal)
                        .and_then(|id| state.rules.get(id));
                }
                resolved = true;
                break;
            }

            if learned_literal.is_some() || !resolved {
                break;
            }
        }

        let learned_literal = learned_literal.unwrap_or_else(|| {
            // Degenerate fallback: negate the last decision of this level.
            queue
                .iter()
                .rev()
                .find(|(lit, _)| state.decisions.decision_level(*lit) == Some(current_level))
                .map(|(lit, _)| -lit)
                .unwrap_or(0)
        });

        if learned_literal == 0 {
            return (0, 0, Vec::new());
        }

        let mut learned = vec![learned_literal];
        for &literal in &other_literals {
            learned.push(literal);
        }

        // Jump to the second-highest level in the clause, never past the
        // assertion level.
        let mut backjump_level = backjump_level;
        if backjump_level >= current_level {
            backjump_level = current_level.saturating_sub(1);
        }
        if backjump_level == 0 && current_level > 1 {
            backjump_level = 1;
        }

        (learned_literal, backjump_level, learned)
    }

    /// Assemble the conflict chain for an unsolvable state.
    fn unsolvable(&self, state: &SolverState, pool: &Pool, conflict_rule: u32) -> SolverError {
        let mut problem = Problem::new();

        if let Some(rule) = state.rules.get(conflict_rule) {
            problem.add_rule(rule, pool);
            for &literal in rule.literals() {
                if let Some(reason_id) = state.decisions.decision_rule(literal) {
                    if let Some(reason) = state.rules.get(reason_id) {
                        problem.add_rule(reason, pool);
                    }
                }
            }
        }

        let mut problems = ProblemSet::new();
        problems.add(problem);
        SolverError::VersionConflict(problems)
    }

    fn build_result(&self, state: &SolverState, pool: &Pool, request: &Request) -> SolverResult {
        let mut result = SolverResult {
            stats: state.stats,
            ..SolverResult::default()
        };

        let mut seen: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();

        for package_id in state.decisions.installed_packages() {
            match pool.entry(package_id) {
                Some(PoolEntry::Alias(alias)) => {
                    result.aliases.push(Arc::clone(alias));
                }
                Some(PoolEntry::Package(package)) => {
                    if request.is_fixed(&package.name) {
                        continue;
                    }
                    let key = (package.name.to_lowercase(), package.version.clone());
                    if seen.insert(key) {
                        result.packages.push(Arc::clone(package));
                    }
                }
                None => {}
            }
        }

        result
            .packages
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        result
    }
}

struct SolverState {
    rules: RuleSet,
    decisions: Decisions,
    watch_graph: WatchGraph,
    /// Next queue entry to propagate; avoids reprocessing after backjumps.
    propagate_index: usize,
    /// Where the circular rule scan resumes.
    rule_cursor: usize,
    stats: SolverStats,
}

impl SolverState {
    fn new(rules: RuleSet) -> Self {
        let watch_graph = WatchGraph::from_rules(&rules);
        Self {
            rules,
            decisions: Decisions::new(),
            watch_graph,
            propagate_index: 0,
            rule_cursor: 0,
            stats: SolverStats::default(),
        }
    }

    fn reset_propagate_index(&mut self) {
        self.propagate_index = self.decisions.len();
    }
}
