//! The unification engine
//!
//! Drives the constraint queue: constraints are instantiated under the
//! current substitution, classified, and either solved by assignment
//! (waking every constraint that mentions the assigned metavariable) or
//! enqueued with a band priority. Branching constraints (flex-rigid
//! equalities, choice constraints, plugin constraints) push a case split
//! carrying a snapshot of the persistent state and the unchosen
//! alternatives; a conflict backjumps to the most recent split whose
//! assumption the conflict's justification actually depends on.
//!
//! Solutions are produced lazily: the first pull drains the queue, later
//! pulls force backtracking with a synthetic conflict depending on every
//! open assumption.

use crate::config::UnifierConfig;
use crate::constraint::{
    null_plugin, ChoiceAlternative, Constraint, Constraints, UnifierPlugin,
};
use crate::error::UnifierError;
use crate::lazy::LazySeq;
use crate::queue::{ConstraintQueue, FIRST_DELAYED, FIRST_VERY_DELAYED};
use crate::simple::{lambda_abstract_locals, occurs_context_check};
use hou_kernel::expr::ExprKind;
use hou_kernel::{
    obligation_sink, Environment, Expr, Justification, Level, Name, NameGenerator, Obligation,
    ObligationSink, Substitution, TypeChecker,
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Outcome of a pattern-assignment attempt
enum MetaEq {
    Assigned,
    Failed,
    Continue,
}

/// State captured at case-split creation; cheap because all parts are
/// persistent
struct Snapshot {
    subst: Substitution,
    queue: ConstraintQueue,
}

/// Remaining alternatives of a case split, by origin
enum CaseAlternatives {
    /// Flex-rigid imitation/projection alternatives (eager)
    HigherOrder(VecDeque<Constraints>),
    /// Plugin alternatives (lazy)
    Plugin(LazySeq<Constraints>),
    /// Choice alternatives (lazy), with the scrutinee and the shared
    /// justification of the originating constraint
    Choice {
        expr: Expr,
        jst: Justification,
        tail: LazySeq<ChoiceAlternative>,
    },
}

/// One alternative pulled out of a case split
enum PulledAlternative {
    Constraints(Constraints),
    Choice(ChoiceAlternative, Expr, Justification),
    Exhausted,
}

/// A backtracking point
struct CaseSplit {
    /// Assumption index of the branch currently being explored
    assumption_idx: u64,
    /// Accumulated justifications of every failed branch of this split
    failed_justifications: Justification,
    snapshot: Snapshot,
    alternatives: CaseAlternatives,
}

/// Higher-order unifier over a set of constraints
pub struct Unifier {
    ngen: NameGenerator,
    subst: Substitution,
    plugin: UnifierPlugin,
    tc: TypeChecker,
    sink: ObligationSink,
    config: UnifierConfig,
    interrupt: Option<Arc<AtomicBool>>,
    num_steps: u64,
    next_assumption_idx: u64,
    next_cidx: u64,
    /// Still to produce the first solution
    first: bool,
    /// Constraints seeded at construction, processed on the first pull
    initial: Option<Vec<Constraint>>,
    queue: ConstraintQueue,
    case_splits: Vec<CaseSplit>,
    conflict: Option<Justification>,
}

impl Unifier {
    pub fn new(
        env: &Environment,
        cs: Vec<Constraint>,
        mut ngen: NameGenerator,
        config: UnifierConfig,
    ) -> Self {
        let sink = obligation_sink();
        let tc = TypeChecker::new(env.clone(), ngen.child(), sink.clone());
        Self {
            ngen,
            subst: Substitution::new(),
            plugin: null_plugin(),
            tc,
            sink,
            config,
            interrupt: None,
            num_steps: 0,
            next_assumption_idx: 0,
            next_cidx: 0,
            first: true,
            initial: Some(cs),
            queue: ConstraintQueue::new(),
            case_splits: Vec::new(),
            conflict: None,
        }
    }

    /// Install a user plugin
    #[must_use]
    pub fn with_plugin(mut self, plugin: UnifierPlugin) -> Self {
        self.plugin = plugin;
        self
    }

    /// Start from an existing substitution
    #[must_use]
    pub fn with_substitution(mut self, subst: Substitution) -> Self {
        self.subst = subst;
        self
    }

    /// Install an external interrupt flag, polled at every dispatch
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn in_conflict(&self) -> bool {
        self.conflict.is_some()
    }

    pub fn substitution(&self) -> &Substitution {
        &self.subst
    }

    /// Turn the engine into its lazy solution stream
    pub fn solutions(self) -> Solutions {
        Solutions(SolutionsInner::Engine {
            unifier: Box::new(self),
            done: false,
        })
    }

    fn set_conflict(&mut self, j: Justification) {
        trace!(justification = %j, "conflict");
        self.conflict = Some(j);
    }

    fn check_system(&mut self) -> Result<(), UnifierError> {
        if let Some(flag) = &self.interrupt {
            if flag.load(Ordering::Relaxed) {
                return Err(UnifierError::Interrupted);
            }
        }
        self.num_steps += 1;
        if self.num_steps > self.config.max_steps {
            return Err(UnifierError::StepLimit(self.config.max_steps));
        }
        Ok(())
    }

    fn alloc_cidx(&mut self, band: u64) -> u64 {
        let cidx = band + self.next_cidx;
        self.next_cidx += 1;
        cidx
    }

    // -- kernel calls -----------------------------------------------------
    //
    // The type checker emits obligations for pairs it cannot decide; they
    // are drained back through `process_constraint` after each call.

    fn drain_obligations(&mut self) -> Result<(), UnifierError> {
        loop {
            let pending: Vec<Obligation> = self.sink.borrow_mut().drain(..).collect();
            if pending.is_empty() {
                return Ok(());
            }
            for ob in pending {
                let c = match ob {
                    Obligation::ExprEq(lhs, rhs, j) => Constraint::eq(lhs, rhs, j),
                    Obligation::LevelEq(lhs, rhs, j) => Constraint::level_eq(lhs, rhs, j),
                };
                self.process_constraint(c)?;
            }
        }
    }

    fn tc_is_def_eq(
        &mut self,
        a: &Expr,
        b: &Expr,
        j: &Justification,
    ) -> Result<bool, UnifierError> {
        let r = self.tc.is_def_eq(a, b, j);
        if r {
            self.drain_obligations()?;
        } else {
            self.sink.borrow_mut().clear();
        }
        Ok(r)
    }

    fn tc_infer(&mut self, e: &Expr) -> Result<Expr, UnifierError> {
        match self.tc.infer(e) {
            Ok(ty) => {
                self.drain_obligations()?;
                Ok(ty)
            }
            Err(err) => {
                self.sink.borrow_mut().clear();
                Err(UnifierError::Kernel(err))
            }
        }
    }

    // -- assignment and wake-up -------------------------------------------

    /// Assign `v` to the term metavariable `m`. The inferred type of `v`
    /// must be definitionally equal to the declared type of `m`; every
    /// constraint mentioning `m` is re-processed.
    fn assign_expr_meta(
        &mut self,
        m: &Expr,
        v: Expr,
        j: &Justification,
    ) -> Result<bool, UnifierError> {
        let (name, m_ty) = match m.kind() {
            ExprKind::Meta { name, ty } => (name.clone(), ty.clone()),
            _ => return Ok(false),
        };
        debug!(meta = %name, value = %v, "assign");
        self.subst = self.subst.assign_expr(name.clone(), v.clone(), j.clone());
        let v_ty = self.tc_infer(&v)?;
        if self.in_conflict() {
            return Ok(false);
        }
        if !self.tc_is_def_eq(&m_ty, &v_ty, j)? {
            self.set_conflict(j.clone());
            return Ok(false);
        }
        if self.in_conflict() {
            return Ok(false);
        }
        for cidx in self.queue.take_expr_occs(&name) {
            self.process_constraint_cidx(cidx)?;
        }
        Ok(!self.in_conflict())
    }

    /// Assign `v` to the level metavariable `m`; no type obligation
    fn assign_level_meta(
        &mut self,
        name: &Name,
        v: Level,
        j: &Justification,
    ) -> Result<bool, UnifierError> {
        debug!(meta = %name, value = %v, "assign level");
        self.subst = self.subst.assign_level(name.clone(), v, j.clone());
        for cidx in self.queue.take_level_occs(name) {
            self.process_constraint_cidx(cidx)?;
        }
        Ok(!self.in_conflict())
    }

    // -- constraint dispatch ----------------------------------------------

    /// Process a constraint: solve it now if it is easy, otherwise
    /// enqueue it. Returns `Ok(false)` iff the engine is (now) in
    /// conflict.
    pub fn process_constraint(&mut self, c: Constraint) -> Result<bool, UnifierError> {
        if self.in_conflict() {
            return Ok(false);
        }
        self.check_system()?;
        trace!(constraint = %c, "process");
        match &c {
            Constraint::Choice { delayed, .. } => {
                // choice constraints are never easy
                let band = if *delayed { FIRST_VERY_DELAYED } else { 0 };
                let cidx = self.alloc_cidx(band);
                let none = BTreeSet::new();
                self.queue.add(cidx, c, &none, &none);
                Ok(true)
            }
            Constraint::Plugin { args, .. } => {
                let mut lvls = BTreeSet::new();
                let mut exprs = BTreeSet::new();
                for a in args {
                    a.collect_metas(&mut lvls, &mut exprs);
                }
                let cidx = self.alloc_cidx(0);
                self.queue.add(cidx, c, &lvls, &exprs);
                Ok(true)
            }
            Constraint::Eq { .. } => self.process_eq_constraint(c),
            Constraint::LevelEq { .. } => self.process_level_eq_constraint(c),
        }
    }

    /// Remove the constraint with id `cidx` from the queue (if still
    /// present) and re-dispatch it
    fn process_constraint_cidx(&mut self, cidx: u64) -> Result<bool, UnifierError> {
        if self.in_conflict() {
            return Ok(false);
        }
        match self.queue.remove(cidx) {
            Some(c) => self.process_constraint(c),
            None => Ok(true),
        }
    }

    /// Pattern-assignment step: `lhs` of the form `?m x1 ... xn` with
    /// distinct local arguments, and `rhs` not headed by `?m`
    fn process_metavar_eq(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        j: &Justification,
    ) -> Result<MetaEq, UnifierError> {
        if !lhs.is_meta_headed() {
            return Ok(MetaEq::Continue);
        }
        let Some((m, locals)) = lhs.as_simple_meta_pattern() else {
            return Ok(MetaEq::Continue);
        };
        if rhs.is_meta_headed() && rhs.get_app_fn() == &m {
            // same head on both sides is left to the flex-flex band
            return Ok(MetaEq::Continue);
        }
        let Some(m_name) = m.meta_name().cloned() else {
            return Ok(MetaEq::Continue);
        };
        if !occurs_context_check(rhs, &m_name, &locals) {
            self.set_conflict(j.clone());
            return Ok(MetaEq::Failed);
        }
        debug_assert!(!self.subst.is_assigned_expr(&m_name));
        let v = lambda_abstract_locals(rhs, &locals);
        if self.assign_expr_meta(&m, v, j)? {
            Ok(MetaEq::Assigned)
        } else {
            Ok(MetaEq::Failed)
        }
    }

    fn process_eq_constraint(&mut self, c: Constraint) -> Result<bool, UnifierError> {
        let (lhs0, rhs0, j0) = match &c {
            Constraint::Eq { lhs, rhs, j } => (lhs.clone(), rhs.clone(), j.clone()),
            _ => return Ok(true),
        };
        // instantiate assigned metavariables
        let li = self.subst.instantiate_expr(&lhs0);
        let ri = self.subst.instantiate_expr(&rhs0);
        let lhs = li.value;
        let rhs = ri.value;

        if lhs == rhs {
            return Ok(true); // trivial constraint
        }

        let j = Justification::composite(
            j0,
            Justification::composite(li.justification, ri.justification),
        );
        if !lhs.has_meta() && !rhs.has_meta() {
            self.set_conflict(j);
            return Ok(false); // trivial failure
        }

        // higher-order pattern matching, both orientations
        match self.process_metavar_eq(&lhs, &rhs, &j)? {
            MetaEq::Assigned => return Ok(true),
            MetaEq::Failed => return Ok(false),
            MetaEq::Continue => {}
        }
        match self.process_metavar_eq(&rhs, &lhs, &j)? {
            MetaEq::Assigned => return Ok(true),
            MetaEq::Failed => return Ok(false),
            MetaEq::Continue => {}
        }

        // expose the head constructors
        let rhs = self.tc.whnf(&rhs);
        let lhs = self.tc.whnf(&lhs);

        if lhs != lhs0 || rhs != rhs0 {
            // something was instantiated or reduced: ask the kernel again
            if self.tc_is_def_eq(&lhs, &rhs, &j)? {
                return Ok(!self.in_conflict());
            }
            self.set_conflict(j);
            return Ok(false);
        }

        let mut lvls = li.unassigned_levels;
        lvls.extend(ri.unassigned_levels);
        let mut exprs = li.unassigned_exprs;
        exprs.extend(ri.unassigned_exprs);

        let band = if lhs.is_meta_headed() && rhs.is_meta_headed() {
            FIRST_VERY_DELAYED // flex-flex is delayed the most
        } else if lhs.is_meta_headed() || rhs.is_meta_headed() {
            FIRST_DELAYED // flex-rigid
        } else {
            0 // needs the plugin
        };
        let cidx = self.alloc_cidx(band);
        self.queue.add(cidx, c, &lvls, &exprs);
        Ok(true)
    }

    /// Level analogue of [`Unifier::process_metavar_eq`]; a metavariable
    /// occurring under an outer successor on the other side cannot be
    /// satisfied
    fn process_level_metavar_eq(
        &mut self,
        lhs: &Level,
        rhs: &Level,
        j: &Justification,
    ) -> Result<MetaEq, UnifierError> {
        let Some(name) = lhs.meta_name().cloned() else {
            return Ok(MetaEq::Continue);
        };
        if rhs.occurs_meta(&name) {
            if rhs.is_succ() {
                self.set_conflict(j.clone());
                return Ok(MetaEq::Failed);
            }
            return Ok(MetaEq::Continue);
        }
        debug_assert!(!self.subst.is_assigned_level(&name));
        if self.assign_level_meta(&name, rhs.clone(), j)? {
            Ok(MetaEq::Assigned)
        } else {
            Ok(MetaEq::Failed)
        }
    }

    fn process_level_eq_constraint(&mut self, c: Constraint) -> Result<bool, UnifierError> {
        let (lhs0, rhs0, j0) = match &c {
            Constraint::LevelEq { lhs, rhs, j } => (lhs.clone(), rhs.clone(), j.clone()),
            _ => return Ok(true),
        };
        let li = self.subst.instantiate_level(&lhs0);
        let ri = self.subst.instantiate_level(&rhs0);
        let mut lhs = li.value.normalize();
        let mut rhs = ri.value.normalize();

        // eliminate outermost successors
        loop {
            match (lhs.succ_of().cloned(), rhs.succ_of().cloned()) {
                (Some(a), Some(b)) => {
                    lhs = a;
                    rhs = b;
                }
                _ => break,
            }
        }

        if lhs == rhs {
            return Ok(true);
        }

        let j = Justification::composite(
            j0,
            Justification::composite(li.justification, ri.justification),
        );
        if !lhs.has_meta() && !rhs.has_meta() {
            self.set_conflict(j);
            return Ok(false);
        }

        match self.process_level_metavar_eq(&lhs, &rhs, &j)? {
            MetaEq::Assigned => return Ok(true),
            MetaEq::Failed => return Ok(false),
            MetaEq::Continue => {}
        }
        match self.process_level_metavar_eq(&rhs, &lhs, &j)? {
            MetaEq::Assigned => return Ok(true),
            MetaEq::Failed => return Ok(false),
            MetaEq::Continue => {}
        }

        let mut lvls = li.unassigned_levels;
        lvls.extend(ri.unassigned_levels);
        let exprs = BTreeSet::new();
        let new_c = if lhs != lhs0 || rhs != rhs0 {
            Constraint::level_eq(lhs, rhs, j)
        } else {
            c
        };
        let cidx = self.alloc_cidx(FIRST_DELAYED);
        self.queue.add(cidx, new_c, &lvls, &exprs);
        Ok(true)
    }

    /// Process each constraint of an alternative, composing `extra` onto
    /// its justification
    fn process_constraint_list(
        &mut self,
        cs: Constraints,
        extra: &Justification,
    ) -> Result<bool, UnifierError> {
        for c in cs {
            let c = if extra.is_none() {
                c
            } else {
                c.with_extra_justification(extra.clone())
            };
            self.process_constraint(c)?;
        }
        Ok(!self.in_conflict())
    }

    // -- case splits ------------------------------------------------------

    /// Create a backtracking point: snapshot the persistent state, open
    /// a type-checker savepoint, and issue the assumption index for the
    /// branch about to be explored
    fn push_case_split(&mut self, alternatives: CaseAlternatives) -> u64 {
        let assumption_idx = self.next_assumption_idx;
        self.next_assumption_idx += 1;
        self.tc.push();
        let snapshot = Snapshot {
            subst: self.subst.clone(),
            queue: self.queue.clone(),
        };
        debug!(assumption_idx, depth = self.case_splits.len() + 1, "case split");
        self.case_splits.push(CaseSplit {
            assumption_idx,
            failed_justifications: Justification::None,
            snapshot,
            alternatives,
        });
        assumption_idx
    }

    /// Restore the split at `idx` to its snapshot and issue it a fresh
    /// assumption index for its next branch
    fn restore_case_split(&mut self, idx: usize) {
        self.tc.pop();
        self.tc.push();
        let (subst, queue) = {
            let snap = &self.case_splits[idx].snapshot;
            (snap.subst.clone(), snap.queue.clone())
        };
        self.subst = subst;
        self.queue = queue;
        let assumption_idx = self.next_assumption_idx;
        self.next_assumption_idx += 1;
        self.case_splits[idx].assumption_idx = assumption_idx;
        self.conflict = None;
        debug!(assumption_idx, "backjump: case split restored");
    }

    /// Try the next branch of the split at `idx`. Returns `Ok(true)` iff
    /// an alternative was pulled and processed without conflict; with no
    /// remaining alternative, the split's failure ledger is folded into
    /// the conflict.
    fn next_case_split_alternative(&mut self, idx: usize) -> Result<bool, UnifierError> {
        let pulled = {
            let split = &mut self.case_splits[idx];
            match &mut split.alternatives {
                CaseAlternatives::HigherOrder(tail) => match tail.pop_front() {
                    Some(cs) => PulledAlternative::Constraints(cs),
                    None => PulledAlternative::Exhausted,
                },
                CaseAlternatives::Plugin(tail) => {
                    match std::mem::take(tail).pull() {
                        Some((head, rest)) => {
                            *tail = rest;
                            PulledAlternative::Constraints(head)
                        }
                        None => PulledAlternative::Exhausted,
                    }
                }
                CaseAlternatives::Choice { expr, jst, tail } => {
                    match std::mem::take(tail).pull() {
                        Some((head, rest)) => {
                            let expr = expr.clone();
                            let jst = jst.clone();
                            *tail = rest;
                            PulledAlternative::Choice(head, expr, jst)
                        }
                        None => PulledAlternative::Exhausted,
                    }
                }
            }
        };
        match pulled {
            PulledAlternative::Exhausted => {
                let failed = self.case_splits[idx].failed_justifications.clone();
                let conflict = self.conflict.take().unwrap_or_default();
                self.set_conflict(Justification::composite(conflict, failed));
                Ok(false)
            }
            PulledAlternative::Constraints(cs) => {
                self.restore_case_split(idx);
                let a = Justification::assumption(self.case_splits[idx].assumption_idx);
                self.process_constraint_list(cs, &a)
            }
            PulledAlternative::Choice(alt, expr, jst) => {
                self.restore_case_split(idx);
                let a = Justification::assumption(self.case_splits[idx].assumption_idx);
                self.process_choice_result(&expr, alt, Justification::composite(jst, a))
            }
        }
    }

    /// Backjump to the most recent case split the conflict depends on
    /// and explore its next branch. Splits the conflict does not depend
    /// on, and splits that ran out of branches, are popped and
    /// discarded. Returns `Ok(false)` when the stack is exhausted.
    fn resolve_conflict(&mut self) -> Result<bool, UnifierError> {
        debug_assert!(self.in_conflict());
        while !self.case_splits.is_empty() {
            let Some(conflict) = self.conflict.clone() else {
                return Ok(true);
            };
            let top = self.case_splits.len() - 1;
            if conflict.depends_on(self.case_splits[top].assumption_idx) {
                {
                    let split = &mut self.case_splits[top];
                    split.failed_justifications = Justification::composite(
                        split.failed_justifications.clone(),
                        conflict.clone(),
                    );
                }
                if self.next_case_split_alternative(top)? {
                    debug_assert!(!self.in_conflict());
                    return Ok(true);
                }
            }
            self.tc.pop();
            self.case_splits.pop();
        }
        Ok(false)
    }

    // -- flex-rigid branching ---------------------------------------------

    /// Fresh metavariable `?t` with type `Pi x1 ... xk. Sort ?u` for a
    /// fresh universe metavariable `?u`, where the `xi` spine is taken
    /// from `t`
    fn mk_aux_type_metavar_for(&mut self, t: &Expr) -> Expr {
        let new_type = replace_range(t, Expr::sort(Level::meta(self.ngen.next())));
        Expr::metavar(self.ngen.next(), new_type)
    }

    /// Fresh metavariable with type `Pi x1 ... xk. (?t x1 ... xk)` where
    /// `?t` comes from [`Unifier::mk_aux_type_metavar_for`]
    fn mk_aux_metavar_for(&mut self, t: &Expr) -> Expr {
        let num = get_arity(t);
        let r = mk_app_vars(self.mk_aux_type_metavar_for(t), num);
        let new_type = replace_range(t, r);
        Expr::metavar(self.ngen.next(), new_type)
    }

    fn process_flex_rigid_cnstr(&mut self, c: Constraint) -> Result<bool, UnifierError> {
        let (lhs, rhs, j) = match c {
            Constraint::Eq { lhs, rhs, j } => (lhs, rhs, j),
            _ => return Ok(true),
        };
        if lhs.is_meta_headed() {
            self.process_flex_rigid(&lhs, &rhs, &j)
        } else {
            self.process_flex_rigid(&rhs, &lhs, &j)
        }
    }

    /// Generate the projection and imitation alternatives for
    /// `?m a1 ... ak =?= rhs` (rhs rigid) and explore them depth-first
    fn process_flex_rigid(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        j: &Justification,
    ) -> Result<bool, UnifierError> {
        let (m, margs) = lhs.unfold_app();
        let Some(mtype) = m.meta_type().cloned() else {
            return Ok(true);
        };
        let mut alts: Vec<Constraints> = Vec::new();

        // projections
        for (i, marg) in margs.iter().enumerate() {
            let vidx = (margs.len() - 1 - i) as u32;
            if !marg.is_local() && !rhs.is_local() {
                // projecting a non-local argument requires it to equal rhs
                let c1 = Constraint::eq(marg.clone(), rhs.clone(), j.clone());
                let c2 = Constraint::eq(
                    m.clone(),
                    mk_lambda_for(&mtype, Expr::bvar(vidx)),
                    j.clone(),
                );
                alts.push(vec![c1, c2]);
            } else if marg.is_local() && marg == rhs {
                let c1 = Constraint::eq(
                    m.clone(),
                    mk_lambda_for(&mtype, Expr::bvar(vidx)),
                    j.clone(),
                );
                alts.push(vec![c1]);
            }
        }

        // imitation
        let mut cs: Constraints = Vec::new();
        let mut imitate = true;
        match rhs.kind() {
            ExprKind::App(_, _) => {
                let (f, rargs) = rhs.unfold_app();
                let mut sargs = Vec::new();
                for rarg in &rargs {
                    let maux = self.mk_aux_metavar_for(&mtype);
                    cs.push(Constraint::eq(
                        Expr::apps(maux.clone(), margs.iter().cloned()),
                        rarg.clone(),
                        j.clone(),
                    ));
                    sargs.push(mk_app_vars(maux, margs.len() as u32));
                }
                let v = mk_lambda_for(&mtype, Expr::apps(f, sargs));
                cs.push(Constraint::eq(m.clone(), v, j.clone()));
            }
            ExprKind::Lam(b) | ExprKind::Pi(b) => {
                let maux1 = self.mk_aux_metavar_for(&mtype);
                cs.push(Constraint::eq(
                    Expr::apps(maux1.clone(), margs.iter().cloned()),
                    b.ty.clone(),
                    j.clone(),
                ));
                // extend the spine with the binder's domain to type the
                // codomain auxiliary
                let pi = Expr::pi(b.name.clone(), b.ty.clone(), b.body.clone(), b.info);
                let mtype2 = replace_range(&mtype, pi);
                let maux2 = self.mk_aux_metavar_for(&mtype2);
                let fresh = Expr::local(self.ngen.next(), b.ty.clone());
                cs.push(Constraint::eq(
                    Expr::app(
                        Expr::apps(maux2.clone(), margs.iter().cloned()),
                        fresh.clone(),
                    ),
                    b.body.instantiate(&fresh),
                    j.clone(),
                ));
                let k = margs.len() as u32;
                let dom = mk_app_vars(maux1, k);
                let body = mk_app_vars(maux2, k + 1);
                let v0 = if rhs.is_pi() {
                    Expr::pi(b.name.clone(), dom, body, b.info)
                } else {
                    Expr::lam(b.name.clone(), dom, body, b.info)
                };
                cs.push(Constraint::eq(m.clone(), mk_lambda_for(&mtype, v0), j.clone()));
            }
            ExprKind::Sort(_) | ExprKind::Const { .. } => {
                cs.push(Constraint::eq(
                    m.clone(),
                    mk_lambda_for(&mtype, rhs.clone()),
                    j.clone(),
                ));
            }
            ExprKind::Local { .. } => {
                // (fun ctx => local) would not be well-formed
                imitate = false;
            }
            ExprKind::Macro { def, args } => {
                let mut sargs = Vec::new();
                for rarg in args {
                    let maux = self.mk_aux_metavar_for(&mtype);
                    cs.push(Constraint::eq(
                        Expr::apps(maux.clone(), margs.iter().cloned()),
                        rarg.clone(),
                        j.clone(),
                    ));
                    sargs.push(mk_app_vars(maux, margs.len() as u32));
                }
                let v = mk_lambda_for(&mtype, Expr::macro_(def.clone(), sargs));
                cs.push(Constraint::eq(m.clone(), v, j.clone()));
            }
            ExprKind::BVar(_) | ExprKind::Meta { .. } => {
                imitate = false;
            }
        }
        if imitate {
            alts.push(cs);
        }

        if alts.is_empty() {
            self.set_conflict(j.clone());
            return Ok(false);
        }
        trace!(alternatives = alts.len(), "flex-rigid");
        if alts.len() == 1 {
            // a single alternative needs no backtracking point
            let head = alts.swap_remove(0);
            return self.process_constraint_list(head, &Justification::None);
        }
        let head = alts.remove(0);
        let tail: VecDeque<Constraints> = alts.into();
        let aidx = self.push_case_split(CaseAlternatives::HigherOrder(tail));
        let a = Justification::assumption(aidx);
        self.process_constraint_list(head, &a)
    }

    // -- choice and plugin constraints ------------------------------------

    fn process_choice_result(
        &mut self,
        expr: &Expr,
        alt: ChoiceAlternative,
        j: Justification,
    ) -> Result<bool, UnifierError> {
        let j = Justification::composite(j, alt.justification);
        if !self.process_constraint(Constraint::eq(expr.clone(), alt.value, j.clone()))? {
            return Ok(false);
        }
        self.process_constraint_list(alt.constraints, &j)
    }

    fn process_choice_constraint(&mut self, c: Constraint) -> Result<bool, UnifierError> {
        let (expr, alternatives, j0) = match c {
            Constraint::Choice {
                expr,
                alternatives,
                j,
                ..
            } => (expr, alternatives, j),
            _ => return Ok(true),
        };
        if !expr.is_meta_headed() {
            return Err(UnifierError::ChoiceContract(format!(
                "scrutinee is not metavariable-headed: {expr}"
            )));
        }
        let ty = self.tc_infer(&expr)?;
        if self.in_conflict() {
            return Ok(false);
        }
        let inst = self.subst.instantiate_expr(&ty);
        let jst = Justification::composite(j0, inst.justification);
        let alts = (alternatives)(&inst.value, &self.subst, self.ngen.child());
        match alts.pull() {
            None => {
                self.set_conflict(jst);
                Ok(false)
            }
            Some((head, tail)) => {
                let aidx = self.push_case_split(CaseAlternatives::Choice {
                    expr: expr.clone(),
                    jst: jst.clone(),
                    tail,
                });
                let a = Justification::assumption(aidx);
                self.process_choice_result(&expr, head, Justification::composite(jst, a))
            }
        }
    }

    fn process_plugin_constraint(&mut self, c: Constraint) -> Result<bool, UnifierError> {
        let plugin = self.plugin.clone();
        let alts = plugin(&c, self.ngen.child());
        match alts.pull() {
            None => {
                self.set_conflict(c.justification().clone());
                Ok(false)
            }
            Some((head, tail)) => {
                let aidx = self.push_case_split(CaseAlternatives::Plugin(tail));
                let a = Justification::assumption(aidx);
                self.process_constraint_list(head, &a)
            }
        }
    }

    // -- the solution stream ----------------------------------------------

    /// Process the next dequeued constraint. Flex-flex constraints are
    /// conceded (assumed satisfiable); anything that is neither choice
    /// nor flex-rigid nor flex-flex falls to the plugin.
    fn process_dequeued(&mut self, c: Constraint) -> Result<bool, UnifierError> {
        if c.is_choice() {
            self.process_choice_constraint(c)
        } else if c.is_flex_rigid() {
            self.process_flex_rigid_cnstr(c)
        } else if c.is_flex_flex() {
            Ok(true)
        } else {
            self.process_plugin_constraint(c)
        }
    }

    fn failure(&mut self) -> Result<Option<Substitution>, UnifierError> {
        let j = self.conflict.clone().unwrap_or_default();
        debug!(justification = %j, "unification failed");
        if self.config.use_exceptions {
            Err(UnifierError::NoSolution(j))
        } else {
            Ok(None)
        }
    }

    /// Produce the next solution, or `Ok(None)` at end of stream
    ///
    /// The first call drains the queue. Subsequent calls force
    /// backtracking by setting a synthetic conflict that depends on
    /// every open assumption; the stream ends when the case-split stack
    /// is exhausted.
    pub fn next_solution(&mut self) -> Result<Option<Substitution>, UnifierError> {
        if let Some(cs) = self.initial.take() {
            for c in cs {
                self.process_constraint(c)?;
            }
        }
        if self.in_conflict() {
            return self.failure();
        }
        if !self.case_splits.is_empty() {
            let mut all = Justification::None;
            for split in &self.case_splits {
                all = Justification::composite(
                    all,
                    Justification::assumption(split.assumption_idx),
                );
            }
            self.set_conflict(all);
            if !self.resolve_conflict()? {
                return self.failure();
            }
        } else if self.first {
            self.first = false;
        } else {
            return Ok(None);
        }
        while !self.queue.is_empty() {
            self.check_system()?;
            debug_assert!(!self.in_conflict());
            let ok = match self.queue.pop_min() {
                Some((_, c)) => self.process_dequeued(c)?,
                None => break,
            };
            if !ok && !self.resolve_conflict()? {
                return self.failure();
            }
        }
        debug_assert!(!self.in_conflict());
        trace!(
            assignments = self.subst.num_expr_assignments(),
            "solution produced"
        );
        Ok(Some(self.subst.clone()))
    }
}

enum SolutionsInner {
    Empty,
    Single(Option<Substitution>),
    Engine { unifier: Box<Unifier>, done: bool },
}

/// Lazy stream of solutions
///
/// Yields one `Ok(substitution)` per solution; a `NoSolution` or
/// `StepLimit` error ends the stream after being yielded.
pub struct Solutions(SolutionsInner);

impl Solutions {
    pub(crate) fn empty() -> Self {
        Solutions(SolutionsInner::Empty)
    }

    pub(crate) fn single(s: Substitution) -> Self {
        Solutions(SolutionsInner::Single(Some(s)))
    }
}

impl Iterator for Solutions {
    type Item = Result<Substitution, UnifierError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            SolutionsInner::Empty => None,
            SolutionsInner::Single(s) => s.take().map(Ok),
            SolutionsInner::Engine { unifier, done } => {
                if *done {
                    return None;
                }
                match unifier.next_solution() {
                    Ok(Some(s)) => Some(Ok(s)),
                    Ok(None) => {
                        *done = true;
                        None
                    }
                    Err(e) => {
                        *done = true;
                        Some(Err(e))
                    }
                }
            }
        }
    }
}

// -- pi-spine helpers -----------------------------------------------------

/// Rebuild `Pi x1 ... xk. B` as `Pi x1 ... xk. new_range`
fn replace_range(ty: &Expr, new_range: Expr) -> Expr {
    match ty.kind() {
        ExprKind::Pi(b) => Expr::pi(
            b.name.clone(),
            b.ty.clone(),
            replace_range(&b.body, new_range),
            b.info,
        ),
        _ => new_range,
    }
}

/// Number of nested pi binders
fn get_arity(ty: &Expr) -> u32 {
    match ty.kind() {
        ExprKind::Pi(b) => 1 + get_arity(&b.body),
        _ => 0,
    }
}

/// The term `f #(n-1) ... #0`
fn mk_app_vars(f: Expr, n: u32) -> Expr {
    Expr::apps(f, (0..n).rev().map(Expr::bvar))
}

/// Wrap `v` in lambdas matching the pi-spine of `ty`, preserving binder
/// names, domains and info
fn mk_lambda_for(ty: &Expr, v: Expr) -> Expr {
    match ty.kind() {
        ExprKind::Pi(b) => Expr::lam(
            b.name.clone(),
            b.ty.clone(),
            mk_lambda_for(&b.body, v),
            b.info,
        ),
        _ => v,
    }
}
