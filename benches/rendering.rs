use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use shorthand::views::{parse_template, RenderContext, Renderer};
use shorthand::{Bindings, Engine, MemorySource, MemoryStore};

const PAGE: &str = r#"<h1>{{ title }}</h1>
<ul>
{{ for user in users }}
  {{ if user.admin }}<li class="admin">{{ user.name }}</li>{{ else if user.active }}<li>{{ user.name }}</li>{{ else }}<li class="off">{{ lower(user.name) }}</li>{{ end }}
{{ end }}
</ul>
{{ include footer with { year: 2024, note: 'Thanks, all' } }}"#;

fn users(n: usize) -> serde_json::Value {
    let list: Vec<_> = (0..n)
        .map(|i| json!({"name": format!("User {}", i), "admin": i % 10 == 0, "active": i % 3 == 0}))
        .collect();
    json!(list)
}

fn engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_source(
        MemorySource::new()
            .with_template("page", PAGE)
            .with_template("footer", "<footer>{{ note }} {{ year }}</footer>"),
    );
    engine.set("title", "Users");
    engine.set("users", users(100));
    engine
}

fn benchmark_parse(c: &mut Criterion) {
    c.bench_function("parse_template", |b| {
        b.iter(|| {
            let template = parse_template(black_box(PAGE));
            black_box(template)
        })
    });
}

fn benchmark_render(c: &mut Criterion) {
    let template = parse_template("{{ for user in users }}{{ user.name }},{{ end }}")
        .unwrap_or_default();
    let mut bindings = Bindings::new();
    bindings.set("users", users(100));

    c.bench_function("render_loop_100", |b| {
        b.iter(|| {
            let output = Renderer::new(RenderContext::from_bindings(&bindings)).render(&template);
            black_box(output)
        })
    });
}

fn benchmark_engine(c: &mut Criterion) {
    let mut uncached = engine();
    c.bench_function("engine_render_uncached", |b| {
        b.iter(|| black_box(uncached.render("page")))
    });

    let mut cached = engine();
    cached.set_cache_store(MemoryStore::new());
    cached.enable_caching(true);
    c.bench_function("engine_render_cached", |b| {
        b.iter(|| black_box(cached.render("page")))
    });
}

criterion_group!(benches, benchmark_parse, benchmark_render, benchmark_engine);
criterion_main!(benches);
