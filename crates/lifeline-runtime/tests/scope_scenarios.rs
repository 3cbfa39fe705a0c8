#![forbid(unsafe_code)]

//! End-to-end lifecycle scenarios for the scoped registry and the manual
//! signal manager, driven through harness emitters and the virtual clock.
//!
//! Each test checks the handler tables on every emitter involved after
//! the dust settles, plus the stale-unsubscribe counters: a release must
//! never name a handle the emitter no longer knows.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use lifeline_core::{Callback, ConnectFlags, Subscribable, TimerFlow};
use lifeline_harness::{Emitter, VirtualScheduler};
use lifeline_runtime::{
    ConnectOptions, RegistryConfig, ScopeRegistry, ScopedHandler, SignalManager,
    SubscriptionQuery,
};
use tracing::{Level, info};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::TRACE)
        .try_init();
}

fn noop() -> Callback {
    Callback::new(|_| {})
}

fn assert_clean(emitters: &[&Rc<Emitter>]) {
    for e in emitters {
        assert_eq!(e.stale_unsubscribes(), 0, "stale unsubscribe on {}", e.name());
    }
}

#[test]
fn tracked_widget_destroyed_before_settings() {
    init_tracing();
    let registry = ScopeRegistry::default();
    let settings = Emitter::new("settings");
    let label = Emitter::new("label");
    let hits = Rc::new(Cell::new(0));
    let hits_in = Rc::clone(&hits);

    registry
        .connect_scoped(
            &settings,
            &[
                ScopedHandler::new(
                    "changed::font",
                    Callback::new(move |_| hits_in.set(hits_in.get() + 1)),
                ),
                ScopedHandler::new("changed::color", noop()),
            ],
            &label,
        )
        .unwrap();

    settings.notify("changed::font");
    assert_eq!(hits.get(), 1);

    info!("destroying tracked label");
    assert!(label.destroy());
    settings.notify("changed::font");
    assert_eq!(hits.get(), 1);
    assert_eq!(settings.handler_count(), 0);
    assert_eq!(registry.tracker_count(), 0);

    registry.disconnect_scoped(&settings, &label);
    assert_clean(&[&settings, &label]);
}

#[test]
fn owner_destroyed_while_objects_tracked() {
    init_tracing();
    let registry = ScopeRegistry::default();
    let owner = Emitter::new("monitor-manager");
    let panels: Vec<_> = (0..4).map(|i| Emitter::new(format!("panel{i}"))).collect();
    for panel in &panels {
        registry
            .connect_scoped(&owner, &[("monitors-changed", noop()).into()], panel)
            .unwrap();
    }
    assert_eq!(registry.tracked_count(&owner), 4);
    assert_eq!(registry.snapshot().handler_count(), 4);

    owner.destroy();

    assert_eq!(registry.tracker_count(), 0);
    for panel in &panels {
        assert_eq!(panel.handler_count(), 0);
        assert!(!registry.is_tracking(&owner, panel));
    }
    let mut all: Vec<&Rc<Emitter>> = panels.iter().collect();
    all.push(&owner);
    assert_clean(&all);
}

#[test]
fn tracked_teardown_reentrantly_destroys_owner() {
    init_tracing();
    let registry = ScopeRegistry::default();
    let owner = Emitter::new("owner");
    let x = Emitter::new("x");
    let y = Emitter::new("y");

    let owner_weak = Rc::downgrade(&owner);
    x.subscribe(
        "destroy",
        Callback::new(move |_| {
            if let Some(owner) = owner_weak.upgrade() {
                owner.destroy();
            }
        })
        .handler(),
        ConnectFlags::empty(),
    );

    registry
        .connect_scoped(&owner, &[("sig", noop()).into()], &x)
        .unwrap();
    registry
        .connect_scoped(&owner, &[("sig", noop()).into()], &y)
        .unwrap();

    x.destroy();

    assert!(owner.is_destroyed());
    assert_eq!(registry.tracker_count(), 0);
    assert_eq!(y.handler_count(), 0);
    assert_clean(&[&owner, &x, &y]);
}

#[test]
fn teardown_handler_disconnects_sibling() {
    init_tracing();
    let registry = ScopeRegistry::default();
    let owner = Emitter::new("owner");
    let x = Emitter::new("x");
    let y = Emitter::new("y");
    let handle = registry.handle();

    let (owner_weak, y_weak) = (Rc::downgrade(&owner), Rc::downgrade(&y));
    x.subscribe(
        "destroy",
        Callback::new(move |_| {
            if let (Some(owner), Some(y)) = (owner_weak.upgrade(), y_weak.upgrade()) {
                handle.disconnect_scoped(&owner, &y);
            }
        })
        .handler(),
        ConnectFlags::empty(),
    );
    registry
        .connect_scoped(&owner, &[("sig", noop()).into()], &x)
        .unwrap();
    registry
        .connect_scoped(&owner, &[("sig", noop()).into()], &y)
        .unwrap();

    x.destroy();

    assert_eq!(registry.tracker_count(), 0);
    assert_eq!(owner.handler_count(), 0);
    assert_eq!(y.handler_count(), 0);
    assert_clean(&[&owner, &x, &y]);
}

#[test]
fn reconnect_from_scoped_handler() {
    init_tracing();
    let registry = ScopeRegistry::default();
    let handle = registry.handle();
    let owner = Emitter::new("owner");
    let x = Emitter::new("x");
    let fired = Rc::new(Cell::new(0));

    let fired_in = Rc::clone(&fired);
    let owner_weak = Rc::downgrade(&owner);
    let x_weak = Rc::downgrade(&x);
    let relink = Callback::new(move |_| {
        fired_in.set(fired_in.get() + 1);
        if let (Some(owner), Some(x)) = (owner_weak.upgrade(), x_weak.upgrade()) {
            handle
                .connect_scoped(&owner, &[("late", Callback::new(|_| {})).into()], &x)
                .unwrap();
        }
    });
    registry
        .connect_scoped(&owner, &[("sig", relink).into()], &x)
        .unwrap();

    owner.notify("sig");
    owner.notify("sig");
    assert_eq!(fired.get(), 2);
    assert_eq!(owner.handler_count_for("late"), 2);
    assert_eq!(x.handler_count_for("destroy"), 1);

    x.destroy();
    assert_eq!(owner.handler_count(), 0);
    assert_clean(&[&owner, &x]);
}

#[test]
fn custom_teardown_signal_is_honored() {
    init_tracing();
    let registry = ScopeRegistry::default();
    let owner = Emitter::new("owner");
    let proxy = Emitter::with_teardown_signal("proxy", "vanished");
    registry
        .connect_scoped(&owner, &[("sig", noop()).into()], &proxy)
        .unwrap();
    assert_eq!(proxy.handler_count_for("vanished"), 1);
    proxy.notify("destroy");
    assert!(registry.is_tracking(&owner, &proxy));
    proxy.destroy();
    assert!(!registry.is_tracking(&owner, &proxy));
    assert_eq!(owner.handler_count(), 0);
}

#[test]
fn shutdown_releases_leaked_owners() {
    init_tracing();
    let registry = ScopeRegistry::new(RegistryConfig::new().with_report_leaks(true));
    let app = Emitter::plain("app");
    registry.attach_shutdown(&app);
    assert!(registry.snapshot().shutdown_hooked);

    let owners: Vec<_> = (0..3).map(|i| Emitter::new(format!("owner{i}"))).collect();
    let tracked = Emitter::new("tracked");
    for owner in &owners {
        registry
            .connect_scoped(owner, &[("sig", noop()).into()], &tracked)
            .unwrap();
    }
    assert_eq!(registry.tracker_count(), 3);
    assert_eq!(tracked.handler_count_for("destroy"), 3);

    app.notify("shutdown");

    assert_eq!(registry.tracker_count(), 0);
    assert_eq!(tracked.handler_count(), 0);
    for owner in &owners {
        assert_eq!(owner.handler_count(), 0);
    }
    // Hook stays attached; a second signal is harmless.
    app.notify("shutdown");
    assert!(registry.snapshot().shutdown_hooked);
}

#[test]
fn manager_finalize_releases_subscriptions_and_timers() {
    init_tracing();
    let scheduler = VirtualScheduler::new();
    let component = Rc::new(RefCell::new(Vec::<String>::new()));
    let manager = SignalManager::new(scheduler.clone()).with_owner(&component);
    let source = Emitter::new("source");

    let log = Callback::new(|e| {
        if let Some(this) = e.this_as::<RefCell<Vec<String>>>() {
            this.borrow_mut().push(e.signal().to_owned());
        }
    });
    manager.connect(&source, "notify::visible", &log);
    manager
        .connect_with(
            &source,
            "clicked",
            &log,
            ConnectOptions::new().flags(ConnectFlags::AFTER),
        )
        .unwrap();

    let ticks = Rc::new(Cell::new(0));
    let ticks_in = Rc::clone(&ticks);
    manager.add_named_timer("poll", Some(Duration::from_millis(100)), move |_| {
        ticks_in.set(ticks_in.get() + 1);
        TimerFlow::Continue
    });

    source.notify("notify::visible");
    source.notify("clicked");
    scheduler.advance(Duration::from_millis(250));
    assert_eq!(*component.borrow(), ["notify::visible", "clicked"]);
    assert_eq!(ticks.get(), 2);
    assert!(manager.is_connected(SubscriptionQuery::any().target(&source)));

    manager.finalize();

    assert!(manager.is_empty());
    assert_eq!(source.handler_count(), 0);
    assert_eq!(scheduler.pending(), 0);
    scheduler.advance(Duration::from_millis(500));
    assert_eq!(ticks.get(), 2);
    manager.finalize();
    assert_eq!(scheduler.stale_cancels(), 0);
    assert_clean(&[&source]);
}

#[test]
fn manager_and_registry_share_an_emitter() {
    init_tracing();
    let registry = ScopeRegistry::default();
    let manager = SignalManager::new(VirtualScheduler::new());
    let owner = Emitter::new("owner");
    let x = Emitter::new("x");

    let cb = noop();
    manager.connect(&owner, "sig", &cb);
    registry
        .connect_scoped(&owner, &[("sig", cb.clone()).into()], &x)
        .unwrap();
    assert_eq!(owner.handler_count_for("sig"), 2);

    x.destroy();
    assert_eq!(owner.handler_count_for("sig"), 1);
    assert!(manager.is_connected(SubscriptionQuery::any().signal("sig")));

    manager.finalize();
    assert_eq!(owner.handler_count(), 0);
    assert_clean(&[&owner, &x]);
}

#[test]
fn env_config_drives_shutdown_signal() {
    init_tracing();
    let config = RegistryConfig::from_env_with(|key| {
        (key == "LIFELINE_SHUTDOWN_SIGNAL").then(|| "session-end".to_owned())
    });
    let registry = ScopeRegistry::new(config);
    let app = Emitter::plain("app");
    let owner = Emitter::new("owner");
    registry.attach_shutdown(&app);
    registry
        .connect_scoped(&owner, &[("sig", noop()).into()], &owner)
        .unwrap();
    app.notify("shutdown");
    assert_eq!(registry.tracker_count(), 1);
    app.notify("session-end");
    assert_eq!(registry.tracker_count(), 0);
    drop(registry);
    assert_eq!(app.handler_count(), 0);
}
