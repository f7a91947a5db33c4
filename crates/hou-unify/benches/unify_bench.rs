//! Unifier benchmarks
//!
//! Measures the first-order fast path (pattern assignment plus wake-up)
//! and the higher-order flex-rigid enumeration.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hou_kernel::{
    BinderInfo, Declaration, Environment, Expr, Justification, Name, NameGenerator,
};
use hou_unify::{unify, Constraint, UnifierConfig};
use std::hint::black_box;

fn ty_a() -> Expr {
    Expr::const_(Name::simple("A"), vec![])
}

fn cnst(n: &str) -> Expr {
    Expr::const_(Name::simple(n), vec![])
}

fn bench_env() -> Environment {
    let mut env = Environment::new();
    env.add_decl(Declaration::axiom(Name::simple("A"), vec![], Expr::type_()))
        .unwrap();
    env.add_decl(Declaration::axiom(Name::simple("c"), vec![], ty_a()))
        .unwrap();
    env.add_decl(Declaration::axiom(
        Name::simple("f"),
        vec![],
        Expr::pi(Name::simple("x"), ty_a(), ty_a(), BinderInfo::Default),
    ))
    .unwrap();
    env
}

/// `?m_0 =?= c, ?m_1 =?= f ?m_0, ..., ?m_n =?= f ?m_{n-1}`
fn chain_constraints(n: u64) -> Vec<Constraint> {
    let meta = |i: u64| Expr::metavar(Name::simple("m").append_num(i), ty_a());
    let mut cs = vec![Constraint::eq(
        meta(0),
        cnst("c"),
        Justification::asserted("chain 0"),
    )];
    for i in 1..n {
        cs.push(Constraint::eq(
            meta(i),
            Expr::app(cnst("f"), meta(i - 1)),
            Justification::asserted("chain"),
        ));
    }
    cs
}

fn bench_first_order_chain(c: &mut Criterion) {
    let env = bench_env();
    let mut group = c.benchmark_group("first_order_chain");
    for n in [8u64, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let sols = unify(
                    &env,
                    chain_constraints(n),
                    NameGenerator::new(Name::simple("u")),
                    UnifierConfig::default(),
                );
                black_box(sols.take(1).count())
            });
        });
    }
    group.finish();
}

fn bench_flex_rigid(c: &mut Criterion) {
    let env = bench_env();
    // ?m x x =?= f x forces imitation plus a projection case split
    let m = Expr::metavar(
        Name::simple("m"),
        Expr::pi(
            Name::simple("x"),
            ty_a(),
            Expr::pi(Name::simple("y"), ty_a(), ty_a(), BinderInfo::Default),
            BinderInfo::Default,
        ),
    );
    let x = Expr::local(Name::simple("x"), ty_a());
    let lhs = Expr::apps(m, [x.clone(), x.clone()]);
    let rhs = Expr::app(cnst("f"), x);

    c.bench_function("flex_rigid_enumeration", |b| {
        b.iter(|| {
            let sols = unify(
                &env,
                vec![Constraint::eq(
                    lhs.clone(),
                    rhs.clone(),
                    Justification::asserted("bench"),
                )],
                NameGenerator::new(Name::simple("u")),
                UnifierConfig::default().with_use_exceptions(false),
            );
            black_box(sols.count())
        });
    });
}

criterion_group!(benches, bench_first_order_chain, bench_flex_rigid);
criterion_main!(benches);
