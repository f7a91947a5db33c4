//! End-to-end unification scenarios
//!
//! Each test drives the public API: constraints in, lazy solution stream
//! out. The environment declares `A : Type`, constants `c : A`,
//! `f g : A -> A` and `h : A -> A -> A`.

use hou_kernel::{
    BinderInfo, Declaration, Environment, Expr, Justification, Level, Name, NameGenerator,
    Substitution,
};
use hou_unify::{
    unify, unify_exprs, unify_with_plugin, ChoiceAlternative, Constraint, LazySeq, Solutions,
    UnifierConfig, UnifierError,
};
use std::sync::Arc;

fn ty_a() -> Expr {
    Expr::const_(Name::simple("A"), vec![])
}

fn arrow(dom: Expr, cod: Expr) -> Expr {
    Expr::pi(Name::simple("x"), dom, cod, BinderInfo::Default)
}

fn test_env() -> Environment {
    let mut env = Environment::new();
    env.add_decl(Declaration::axiom(Name::simple("A"), vec![], Expr::type_()))
        .unwrap();
    env.add_decl(Declaration::axiom(Name::simple("c"), vec![], ty_a()))
        .unwrap();
    env.add_decl(Declaration::axiom(
        Name::simple("f"),
        vec![],
        arrow(ty_a(), ty_a()),
    ))
    .unwrap();
    env.add_decl(Declaration::axiom(
        Name::simple("g"),
        vec![],
        arrow(ty_a(), ty_a()),
    ))
    .unwrap();
    env.add_decl(Declaration::axiom(
        Name::simple("h"),
        vec![],
        arrow(ty_a(), arrow(ty_a(), ty_a())),
    ))
    .unwrap();
    env
}

fn cnst(n: &str) -> Expr {
    Expr::const_(Name::simple(n), vec![])
}

fn local(n: &str) -> Expr {
    Expr::local(Name::simple(n), ty_a())
}

fn meta0(n: &str) -> Expr {
    Expr::metavar(Name::simple(n), ty_a())
}

fn meta1(n: &str) -> Expr {
    Expr::metavar(Name::simple(n), arrow(ty_a(), ty_a()))
}

fn meta2(n: &str) -> Expr {
    Expr::metavar(Name::simple(n), arrow(ty_a(), arrow(ty_a(), ty_a())))
}

fn ngen() -> NameGenerator {
    NameGenerator::new(Name::simple("u"))
}

fn run(env: &Environment, cs: Vec<Constraint>) -> Solutions {
    unify(env, cs, ngen(), UnifierConfig::default())
}

fn first_solution(env: &Environment, cs: Vec<Constraint>) -> Substitution {
    run(env, cs).next().expect("a solution").expect("no error")
}

#[test]
fn empty_constraint_set_yields_initial_substitution_once() {
    let env = test_env();
    let mut sols = run(&env, Vec::new());
    let s = sols.next().unwrap().unwrap();
    assert_eq!(s.num_expr_assignments(), 0);
    assert_eq!(s.num_level_assignments(), 0);
    assert!(sols.next().is_none());
}

#[test]
fn reflexive_constraint_is_solved_without_branching() {
    let env = test_env();
    let e = Expr::app(cnst("f"), cnst("c"));
    let s = first_solution(
        &env,
        vec![Constraint::eq(e.clone(), e, Justification::asserted("refl"))],
    );
    assert_eq!(s.num_expr_assignments(), 0);
}

#[test]
fn meta_equals_constant() {
    // ?m =?= c  has the unique solution  ?m := c
    let env = test_env();
    let m = meta0("m");
    let mut sols = run(
        &env,
        vec![Constraint::eq(
            m.clone(),
            cnst("c"),
            Justification::asserted("?m =?= c"),
        )],
    );
    let s = sols.next().unwrap().unwrap();
    assert_eq!(s.instantiate_expr(&m).value, cnst("c"));
    assert!(sols.next().is_none());
}

#[test]
fn pattern_assignment_builds_identity() {
    // ?m x =?= x  solves to  ?m := fun x => x
    let env = test_env();
    let m = meta1("m");
    let x = local("x");
    let lhs = Expr::app(m.clone(), x.clone());
    let s = first_solution(
        &env,
        vec![Constraint::eq(lhs, x.clone(), Justification::asserted("c0"))],
    );
    let expected = Expr::lam(Name::simple("x"), ty_a(), Expr::bvar(0), BinderInfo::Default);
    assert_eq!(s.instantiate_expr(&m).value, expected);
}

#[test]
fn pattern_assignment_imitates_application() {
    // ?m x =?= f x  solves to  ?m := fun x => f x
    let env = test_env();
    let m = meta1("m");
    let x = local("x");
    let lhs = Expr::app(m.clone(), x.clone());
    let rhs = Expr::app(cnst("f"), x.clone());
    let s = first_solution(
        &env,
        vec![Constraint::eq(
            lhs.clone(),
            rhs.clone(),
            Justification::asserted("c0"),
        )],
    );
    assert_eq!(s.instantiate_expr(&lhs).value, rhs);
}

#[test]
fn two_argument_pattern() {
    // ?m a b =?= h a b  with distinct locals solves to  ?m := fun x y => h x y
    let env = test_env();
    let m = meta2("m");
    let a = local("a");
    let b = local("b");
    let lhs = Expr::apps(m.clone(), [a.clone(), b.clone()]);
    let rhs = Expr::apps(cnst("h"), [a.clone(), b.clone()]);
    let s = first_solution(
        &env,
        vec![Constraint::eq(
            lhs.clone(),
            rhs.clone(),
            Justification::asserted("c0"),
        )],
    );
    assert_eq!(s.instantiate_expr(&lhs).value, rhs);
    // the abstraction closes over both arguments: applying it to fresh
    // locals reproduces h on those locals
    let p = local("p");
    let q = local("q");
    let applied = Expr::apps(m.clone(), [p.clone(), q.clone()]);
    assert_eq!(
        s.instantiate_expr(&applied).value,
        Expr::apps(cnst("h"), [p, q])
    );
}

#[test]
fn flex_rigid_enumerates_projections_lazily() {
    // ?m x x =?= f x is not a pattern (repeated local), so the engine
    // imitates with an auxiliary ?aux, and  ?aux x x =?= x  branches into
    // the two projections. Both branches close the original constraint;
    // the stream produces exactly the two solutions.
    let env = test_env();
    let m = meta2("m");
    let x = local("x");
    let lhs = Expr::apps(m.clone(), [x.clone(), x.clone()]);
    let rhs = Expr::app(cnst("f"), x.clone());
    let cs = vec![Constraint::eq(
        lhs.clone(),
        rhs.clone(),
        Justification::asserted("c0"),
    )];
    let mut sols = unify(
        &env,
        cs,
        ngen(),
        UnifierConfig::default().with_use_exceptions(false),
    );

    let s1 = sols.next().unwrap().unwrap();
    assert_eq!(s1.instantiate_expr(&lhs).value, rhs);

    let s2 = sols.next().unwrap().unwrap();
    assert_eq!(s2.instantiate_expr(&lhs).value, rhs);

    // the two branches project different arguments
    let p = local("p");
    let q = local("q");
    let applied = Expr::apps(m.clone(), [p.clone(), q.clone()]);
    let r1 = s1.instantiate_expr(&applied).value;
    let r2 = s2.instantiate_expr(&applied).value;
    assert_ne!(r1, r2);
    assert!(r1 == Expr::app(cnst("f"), p.clone()) || r1 == Expr::app(cnst("f"), q.clone()));

    assert!(sols.next().is_none());
}

#[test]
fn occurs_check_is_a_hard_failure() {
    // ?m =?= f ?m
    let env = test_env();
    let m = meta0("m");
    let rhs = Expr::app(cnst("f"), m.clone());
    let label = "?m =?= f ?m";
    let mut sols = run(
        &env,
        vec![Constraint::eq(m, rhs, Justification::asserted(label))],
    );
    match sols.next() {
        Some(Err(UnifierError::NoSolution(j))) => {
            assert!(j.to_string().contains(label), "justification was: {j}");
        }
        other => panic!("expected NoSolution, got {other:?}"),
    }
}

#[test]
fn scope_check_is_a_hard_failure() {
    // ?m x =?= y  with y not among the pattern arguments
    let env = test_env();
    let lhs = Expr::app(meta1("m"), local("x"));
    let mut sols = run(
        &env,
        vec![Constraint::eq(
            lhs,
            local("y"),
            Justification::asserted("scope"),
        )],
    );
    assert!(matches!(sols.next(), Some(Err(UnifierError::NoSolution(_)))));
}

#[test]
fn failures_are_silent_without_exceptions() {
    let env = test_env();
    let lhs = Expr::app(meta1("m"), local("x"));
    let mut sols = unify(
        &env,
        vec![Constraint::eq(
            lhs,
            local("y"),
            Justification::asserted("scope"),
        )],
        ngen(),
        UnifierConfig::default().with_use_exceptions(false),
    );
    assert!(sols.next().is_none());
}

#[test]
fn rigid_rigid_mismatch_fails_immediately() {
    let env = test_env();
    let mut sols = run(
        &env,
        vec![Constraint::eq(
            cnst("c"),
            Expr::app(cnst("f"), cnst("c")),
            Justification::asserted("bad"),
        )],
    );
    assert!(matches!(sols.next(), Some(Err(UnifierError::NoSolution(_)))));
}

#[test]
fn bare_metavariable_pair_is_assigned() {
    // ?m =?= ?k is a pattern on the left: ?m := ?k
    let env = test_env();
    let m = meta0("m");
    let k = meta0("k");
    let s = first_solution(
        &env,
        vec![Constraint::eq(m.clone(), k.clone(), Justification::asserted("mk"))],
    );
    assert_eq!(s.num_expr_assignments(), 1);
    assert_eq!(s.instantiate_expr(&m).value, k);
}

#[test]
fn flex_flex_constraints_are_conceded() {
    // ?m x x =?= ?k x x: neither side is a pattern, so the constraint is
    // deferred to the very-delayed band and finally assumed satisfiable;
    // a solution is produced with neither metavariable assigned
    let env = test_env();
    let x = local("x");
    let s = first_solution(
        &env,
        vec![Constraint::eq(
            Expr::apps(meta2("m"), [x.clone(), x.clone()]),
            Expr::apps(meta2("k"), [x.clone(), x.clone()]),
            Justification::asserted("ff"),
        )],
    );
    assert_eq!(s.num_expr_assignments(), 0);
}

#[test]
fn same_head_metavariable_is_not_solved_pointwise() {
    // ?m a =?= ?m b must not force a = b; it is conceded as flex-flex
    let env = test_env();
    let m = meta1("m");
    let s = first_solution(
        &env,
        vec![Constraint::eq(
            Expr::app(m.clone(), local("a")),
            Expr::app(m.clone(), local("b")),
            Justification::asserted("same head"),
        )],
    );
    assert_eq!(s.num_expr_assignments(), 0);
}

#[test]
fn chained_assignments_compose() {
    // ?k := f ?m first, then ?m := c; instantiation chases the chain
    let env = test_env();
    let m = meta0("m");
    let k = meta0("k");
    let cs = vec![
        Constraint::eq(
            k.clone(),
            Expr::app(cnst("f"), m.clone()),
            Justification::asserted("c0"),
        ),
        Constraint::eq(m.clone(), cnst("c"), Justification::asserted("c1")),
    ];
    let s = first_solution(&env, cs);
    assert_eq!(s.instantiate_expr(&m).value, cnst("c"));
    assert_eq!(
        s.instantiate_expr(&k).value,
        Expr::app(cnst("f"), cnst("c"))
    );
}

#[test]
fn assignment_wakes_dependent_constraints() {
    // ?k x x =?= f ?m is enqueued flex-rigid and indexed under ?m;
    // assigning ?m re-processes it under the stronger substitution, and
    // the imitation round closes it against f c
    let env = test_env();
    let m = meta0("m");
    let k = meta2("k");
    let x = local("x");
    let lhs = Expr::apps(k.clone(), [x.clone(), x.clone()]);
    let cs = vec![
        Constraint::eq(
            lhs.clone(),
            Expr::app(cnst("f"), m.clone()),
            Justification::asserted("c0"),
        ),
        Constraint::eq(m.clone(), cnst("c"), Justification::asserted("c1")),
    ];
    let s = first_solution(&env, cs);
    assert_eq!(s.instantiate_expr(&m).value, cnst("c"));
    assert_eq!(
        s.instantiate_expr(&lhs).value,
        Expr::app(cnst("f"), cnst("c"))
    );
}

#[test]
fn universe_successors_are_stripped() {
    // succ ?u =?= succ (succ v)  gives  ?u := succ v
    let env = test_env();
    let u = Level::meta(Name::simple("u"));
    let v = Level::param(Name::simple("v"));
    let s = first_solution(
        &env,
        vec![Constraint::level_eq(
            Level::succ(u.clone()),
            Level::succ(Level::succ(v.clone())),
            Justification::asserted("lvl"),
        )],
    );
    assert_eq!(s.instantiate_level(&u).value, Level::succ(v));
}

#[test]
fn universe_occurs_under_successor_fails() {
    // ?u =?= succ ?u
    let env = test_env();
    let u = Level::meta(Name::simple("u"));
    let mut sols = run(
        &env,
        vec![Constraint::level_eq(
            u.clone(),
            Level::succ(u),
            Justification::asserted("lvl"),
        )],
    );
    assert!(matches!(sols.next(), Some(Err(UnifierError::NoSolution(_)))));
}

#[test]
fn step_limit_is_always_raised() {
    // a plugin that regenerates its own constraint forever must be cut
    // off by the step budget, even with exceptions disabled
    let env = test_env();
    let looping = Constraint::plugin(
        Name::simple("loop"),
        vec![],
        Justification::asserted("loop"),
    );
    let plugin: hou_unify::UnifierPlugin = Arc::new(|c: &Constraint, _| {
        let again = c.clone();
        LazySeq::singleton(vec![again])
    });
    let mut sols = unify_with_plugin(
        &env,
        vec![looping],
        ngen(),
        plugin,
        UnifierConfig::default()
            .with_max_steps(500)
            .with_use_exceptions(false),
    );
    match sols.next() {
        Some(Err(UnifierError::StepLimit(500))) => {}
        other => panic!("expected StepLimit, got {other:?}"),
    }
    assert!(sols.next().is_none());
}

#[test]
fn plugin_alternatives_backtrack() {
    // the plugin proposes ?m := c for the opaque constraint, but only
    // after a first alternative that contradicts the other constraint
    let env = test_env();
    let m = meta0("m");
    let opaque = Constraint::plugin(
        Name::simple("hint"),
        vec![m.clone()],
        Justification::asserted("hint"),
    );
    let m_for_plugin = m.clone();
    let plugin: hou_unify::UnifierPlugin = Arc::new(move |c: &Constraint, _| {
        if matches!(c, Constraint::Plugin { .. }) {
            let m1 = m_for_plugin.clone();
            let m2 = m_for_plugin.clone();
            LazySeq::from_vec(vec![
                vec![Constraint::eq(
                    m1.clone(),
                    Expr::const_(Name::simple("g"), vec![]),
                    Justification::asserted("alt1"),
                )],
                vec![Constraint::eq(
                    m2,
                    Expr::const_(Name::simple("c"), vec![]),
                    Justification::asserted("alt2"),
                )],
            ])
        } else {
            LazySeq::empty()
        }
    });
    // ?m = g is ill-typed (g : A -> A, ?m : A), so the first alternative
    // conflicts and the engine backjumps into the second
    let cs = vec![opaque];
    let s = unify_with_plugin(&env, cs, ngen(), plugin, UnifierConfig::default())
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(s.instantiate_expr(&m).value, cnst("c"));
}

#[test]
fn choice_constraints_enumerate_candidates() {
    let env = test_env();
    let m = meta0("m");
    let chooser: hou_unify::ChoiceFn = Arc::new(|_ty, _s, _ngen| {
        LazySeq::from_vec(vec![
            ChoiceAlternative::new(Expr::const_(Name::simple("c"), vec![]))
                .with_justification(Justification::asserted("try c")),
            ChoiceAlternative::new(Expr::app(
                Expr::const_(Name::simple("f"), vec![]),
                Expr::const_(Name::simple("c"), vec![]),
            ))
            .with_justification(Justification::asserted("try f c")),
        ])
    });
    let cs = vec![
        Constraint::choice(m.clone(), chooser, Justification::asserted("choice"), false),
        // forces the second candidate
        Constraint::eq(
            m.clone(),
            Expr::app(cnst("f"), cnst("c")),
            Justification::asserted("pin"),
        ),
    ];
    let s = first_solution(&env, cs);
    assert_eq!(
        s.instantiate_expr(&m).value,
        Expr::app(cnst("f"), cnst("c"))
    );
}

#[test]
fn choice_scrutinee_must_be_meta_headed() {
    let env = test_env();
    let chooser: hou_unify::ChoiceFn = Arc::new(|_, _, _| LazySeq::empty());
    let cs = vec![Constraint::choice(
        cnst("c"),
        chooser,
        Justification::asserted("bad choice"),
        false,
    )];
    let mut sols = run(&env, cs);
    assert!(matches!(
        sols.next(),
        Some(Err(UnifierError::ChoiceContract(_)))
    ));
}

#[test]
fn interrupt_flag_stops_the_engine() {
    use std::sync::atomic::AtomicBool;
    let env = test_env();
    let flag = Arc::new(AtomicBool::new(true));
    let mut u = hou_unify::Unifier::new(
        &env,
        vec![Constraint::eq(
            meta0("m"),
            cnst("c"),
            Justification::asserted("c0"),
        )],
        ngen(),
        UnifierConfig::default(),
    )
    .with_interrupt(flag);
    assert!(matches!(u.next_solution(), Err(UnifierError::Interrupted)));
}

#[test]
fn unify_exprs_fast_path() {
    let env = test_env();
    let m = meta0("m");
    let mut sols = unify_exprs(&env, &m, &cnst("c"), ngen(), UnifierConfig::default());
    let s = sols.next().unwrap().unwrap();
    assert_eq!(s.instantiate_expr(&m).value, cnst("c"));
    assert!(sols.next().is_none());
}

#[test]
fn unify_exprs_rejects_rigid_mismatch() {
    let env = test_env();
    let mut sols = unify_exprs(
        &env,
        &cnst("c"),
        &Expr::app(cnst("f"), cnst("c")),
        ngen(),
        UnifierConfig::default(),
    );
    assert!(sols.next().is_none());
}

#[test]
fn solutions_are_deterministic() {
    let env = test_env();
    let m = meta2("m");
    let x = local("x");
    let lhs = Expr::apps(m.clone(), [x.clone(), x.clone()]);
    let rhs = Expr::app(cnst("f"), x.clone());
    let collect = || -> Vec<Expr> {
        let cs = vec![Constraint::eq(
            lhs.clone(),
            rhs.clone(),
            Justification::asserted("c0"),
        )];
        let p = local("p");
        let q = local("q");
        let applied = Expr::apps(m.clone(), [p, q]);
        unify(
            &env,
            cs,
            ngen(),
            UnifierConfig::default().with_use_exceptions(false),
        )
        .map(|r| r.unwrap().instantiate_expr(&applied).value)
        .collect()
    };
    let run1 = collect();
    let run2 = collect();
    assert_eq!(run1.len(), 2);
    assert_eq!(run1, run2);
}

#[test]
fn solved_constraints_substitute_to_equal_or_conceded_terms() {
    // every returned substitution maps each input constraint to equal
    // terms, or leaves a metavariable-headed side (concession)
    let env = test_env();
    let m = meta1("m");
    let k = meta0("k");
    let x = local("x");
    let cs = vec![
        Constraint::eq(
            Expr::app(m.clone(), x.clone()),
            Expr::app(cnst("f"), x.clone()),
            Justification::asserted("c0"),
        ),
        Constraint::eq(k.clone(), meta0("k2"), Justification::asserted("c1")),
    ];
    let inputs: Vec<(Expr, Expr)> = cs
        .iter()
        .map(|c| match c {
            Constraint::Eq { lhs, rhs, .. } => (lhs.clone(), rhs.clone()),
            _ => unreachable!(),
        })
        .collect();
    for s in run(&env, cs).map(|r| r.unwrap()) {
        for (lhs, rhs) in &inputs {
            let l = s.instantiate_expr(lhs).value;
            let r = s.instantiate_expr(rhs).value;
            assert!(
                l == r || l.is_meta_headed() || r.is_meta_headed(),
                "distinct rigid terms {l} and {r}"
            );
        }
    }
}
