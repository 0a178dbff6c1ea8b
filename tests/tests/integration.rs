//! Cross-crate behavior of the loading service: resolution, layering,
//! hot reload, contexts and process lifecycle.

use std::sync::Arc;
use std::time::Duration;

use strata_kernel::config::{Env, LoaderConfig};
use strata_kernel::resource::ResourceAccess;
use strata_kernel::unit::InMemoryHost;
use strata_kernel::LoaderError;
use strata_loader::{
    CheckOutcome, ContextManager, HotReloadSupervisor, Layer, LayerTier, PathResolver,
    ProcessState, ReloadError, ReloadEvent, SupervisorStatus,
};
use strata_testing::{FlakyAccess, Workspace, manual_settings, settings};
use tokio::runtime::Handle;

fn host_root(host: InMemoryHost) -> Arc<Layer> {
    Arc::new(Layer::host(Arc::new(host)))
}

#[test]
fn folder_tokens_contribute_every_child_and_one_monitor_each() {
    let workspace = Workspace::new().unwrap();
    for (dir, count) in [("d0", 1), ("d1", 2), ("d2", 3)] {
        for i in 0..count {
            workspace.file(&format!("{dir}/lib{i}.jar"), b"x").unwrap();
        }
    }
    let resolver = PathResolver::new(workspace.manager().unwrap());

    let spec = format!(
        "{}, {} ,{}",
        workspace.token("d0"),
        workspace.token("d1"),
        workspace.token("d2")
    );
    let resolution = resolver.resolve(&spec, &Env::new());

    assert_eq!(resolution.entries.len(), 6);
    assert_eq!(resolution.monitored.len(), 3);
    assert!(resolution.warnings.is_empty());
    assert!(resolution.monitored[0].uri().ends_with("/d0"));
    assert!(resolution.monitored[2].uri().ends_with("/d2"));
}

#[test]
fn pattern_token_matches_files_and_monitors_parent() {
    let workspace = Workspace::new().unwrap();
    workspace.file("lib/a.jar", b"a").unwrap();
    workspace.file("lib/ab.jar", b"ab").unwrap();
    workspace.file("lib/b.txt", b"b").unwrap();
    workspace.dir("lib/c.jar").unwrap();
    let resolver = PathResolver::new(workspace.manager().unwrap());

    let spec = format!("{}/.*\\.jar", workspace.token("lib"));
    let resolution = resolver.resolve(&spec, &Env::new());

    let names: Vec<&str> = resolution.entries.iter().map(|e| e.base_name()).collect();
    assert_eq!(names, vec!["a.jar", "ab.jar"]);
    assert_eq!(resolution.monitored.len(), 1);
    assert!(resolution.monitored[0].uri().ends_with("/lib"));
}

#[test]
fn unresolvable_tokens_are_skipped() {
    let workspace = Workspace::new().unwrap();
    workspace.file("lib/a.jar", b"a").unwrap();
    let resolver = PathResolver::new(workspace.manager().unwrap());

    let spec = format!(
        "nope://x/y.jar,{},{}/missing/.*\\.jar",
        workspace.token("lib/a.jar"),
        workspace.token("gone")
    );
    let resolution = resolver.resolve(&spec, &Env::new());

    assert_eq!(resolution.entries.len(), 1);
    assert_eq!(resolution.warnings.len(), 2);
    assert!(!resolution.has_failures());
}

#[tokio::test]
async fn host_and_parents_win_over_children() {
    let workspace = Workspace::new().unwrap();
    workspace.file("extra/classes/com/acme/Shared.unit", b"extra").unwrap();
    workspace.file("dynamic/classes/com/acme/Shared.unit", b"dynamic").unwrap();
    workspace.file("dynamic/classes/com/acme/Only.unit", b"only").unwrap();

    let host = InMemoryHost::new("it").with_unit("core.Base", b"host".to_vec());
    workspace.file("dynamic/classes/core/Base.unit", b"shadow").unwrap();

    let config = LoaderConfig::new()
        .with_cache_dir(workspace.token("cache"))
        .with_extra_classpath(workspace.token("extra"))
        .with_dynamic_classpath(workspace.token("dynamic"));
    let state = ProcessState::builder(config)
        .with_host(Arc::new(host))
        .with_env(Env::new())
        .with_remote(false)
        .build();

    assert_eq!(state.load_code_unit("core.Base").unwrap().bytes(), b"host");
    assert_eq!(state.load_code_unit("com.acme.Shared").unwrap().bytes(), b"extra");
    let only = state.load_code_unit("com.acme.Only").unwrap();
    assert_eq!(only.bytes(), b"only");
    assert!(only.origin().ends_with("classes!/com/acme/Only.unit"));

    state.shutdown();
}

#[tokio::test]
async fn earlier_generation_stays_usable_after_swap() {
    let workspace = Workspace::new().unwrap();
    workspace
        .zip("lib/a.zip", &[("com/acme/A.unit", b"a1")])
        .unwrap();
    let access: Arc<dyn ResourceAccess> = workspace.manager().unwrap();

    let supervisor = HotReloadSupervisor::start(
        workspace.token("lib"),
        LayerTier::Dynamic,
        host_root(InMemoryHost::new("it")),
        access,
        manual_settings(),
        &Handle::current(),
    );
    let first = supervisor.current();
    assert_eq!(first.generation(), 1);
    assert_eq!(supervisor.check_now().unwrap(), CheckOutcome::Unchanged);

    workspace
        .zip("lib/b.zip", &[("com/acme/B.unit", b"b1")])
        .unwrap();
    assert_eq!(supervisor.check_now().unwrap(), CheckOutcome::Swapped(2));

    assert_eq!(first.load("com.acme.A").unwrap().bytes(), b"a1");
    assert!(matches!(
        first.load("com.acme.B"),
        Err(LoaderError::UnitNotFound(name)) if name == "com.acme.B"
    ));
    assert_eq!(supervisor.current().generation(), 2);
    assert_eq!(supervisor.load("com.acme.B").unwrap().bytes(), b"b1");
    assert_eq!(supervisor.load("com.acme.A").unwrap().bytes(), b"a1");

    supervisor.stop();
}

#[tokio::test]
async fn context_change_swaps_only_that_context() {
    let workspace = Workspace::new().unwrap();
    workspace.file("t1/classes/com/acme/T.unit", b"t1").unwrap();
    workspace.file("t2/classes/com/acme/T.unit", b"t2").unwrap();
    let config = LoaderConfig::new()
        .with_context_classpath("t1", workspace.token("t1"))
        .with_context_classpath("t2", workspace.token("t2"));

    let contexts = ContextManager::new(
        host_root(InMemoryHost::new("it")),
        workspace.manager().unwrap(),
        manual_settings(),
        Arc::new(config),
        Handle::current(),
    );
    let t1 = contexts.get("t1").unwrap();
    let t2 = contexts.get("t2").unwrap();
    let t2_layer = t2.current();

    workspace.file("t1/more/com/acme/Extra.unit", b"extra").unwrap();

    assert_eq!(t1.supervisor().check_now().unwrap(), CheckOutcome::Swapped(2));
    assert_eq!(t2.supervisor().check_now().unwrap(), CheckOutcome::Unchanged);
    assert!(Arc::ptr_eq(&t2_layer, &t2.current()));

    assert_eq!(t1.load("com.acme.Extra").unwrap().bytes(), b"extra");
    assert!(t2.load("com.acme.Extra").is_err());
    assert_eq!(t2.load("com.acme.T").unwrap().bytes(), b"t2");

    contexts.shutdown();
    assert_eq!(t1.supervisor().status(), SupervisorStatus::Stopped);
}

#[tokio::test]
async fn contexts_delegate_through_the_dynamic_tier() {
    let workspace = Workspace::new().unwrap();
    workspace.file("lib/ext/Shared.unit", b"ext").unwrap();
    workspace.dir("t1").unwrap();
    let config = LoaderConfig::new()
        .with_cache_dir(workspace.token("cache"))
        .with_dynamic_classpath(workspace.token("lib/ext"))
        .with_context_classpath("t1", workspace.token("t1"))
        .with_monitor_interval(Duration::from_secs(3600));
    let state = ProcessState::builder(config)
        .with_env(Env::new())
        .with_remote(false)
        .build();

    assert_eq!(state.load_code_unit("Shared").unwrap().bytes(), b"ext");
    let context = state.context("t1").unwrap();
    assert_eq!(context.load("Shared").unwrap().bytes(), b"ext");

    // a newer default generation reaches the context on its next check
    workspace.file("lib/ext/Later.unit", b"later").unwrap();
    let dynamic = state.default_accessor().unwrap();
    assert_eq!(dynamic.supervisor().check_now().unwrap(), CheckOutcome::Swapped(2));
    assert_eq!(context.supervisor().check_now().unwrap(), CheckOutcome::Swapped(2));
    assert_eq!(context.load("Later").unwrap().bytes(), b"later");

    state.shutdown();
}

#[tokio::test]
async fn failed_check_keeps_previous_layer() {
    let workspace = Workspace::new().unwrap();
    workspace.file("lib/Old.unit", b"old").unwrap();
    let flaky = Arc::new(FlakyAccess::new(workspace.manager().unwrap()));
    let access: Arc<dyn ResourceAccess> = Arc::clone(&flaky) as Arc<dyn ResourceAccess>;

    let supervisor = HotReloadSupervisor::start(
        workspace.token("lib"),
        LayerTier::Dynamic,
        host_root(InMemoryHost::new("it")),
        access,
        manual_settings(),
        &Handle::current(),
    );
    let mut events = supervisor.subscribe();
    let before = supervisor.current();

    workspace.file("lib/New.unit", b"new").unwrap();
    flaky.set_failing(true);
    assert!(matches!(supervisor.check_now(), Err(ReloadError::Resolution(_))));
    assert!(flaky.failures() > 0);
    assert!(matches!(events.try_recv(), Ok(ReloadEvent::ReloadFailed { .. })));

    assert!(Arc::ptr_eq(&before, &supervisor.current()));
    assert_eq!(supervisor.generation(), 1);
    assert_eq!(supervisor.load("Old").unwrap().bytes(), b"old");
    assert!(supervisor.load("New").is_err());
    assert!(supervisor.is_running());

    flaky.set_failing(false);
    assert_eq!(supervisor.check_now().unwrap(), CheckOutcome::Swapped(2));
    assert_eq!(
        events.try_recv().unwrap(),
        ReloadEvent::Swapped {
            generation: 2,
            entries: 2
        }
    );
    assert_eq!(supervisor.load("New").unwrap().bytes(), b"new");

    supervisor.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn monitor_task_publishes_on_its_own() {
    let workspace = Workspace::new().unwrap();
    workspace.file("lib/One.unit", b"1").unwrap();

    let supervisor = HotReloadSupervisor::start(
        workspace.token("lib"),
        LayerTier::Dynamic,
        host_root(InMemoryHost::new("it")),
        workspace.manager().unwrap(),
        settings(Duration::from_millis(25)),
        &Handle::current(),
    );
    let mut events = supervisor.subscribe();

    // complete before it becomes visible to the monitor
    let staged = workspace.file("staged/Two.unit", b"2").unwrap();
    std::fs::rename(staged, workspace.path().join("lib/Two.unit")).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("swap within timeout")
        .unwrap();
    assert!(matches!(event, ReloadEvent::Swapped { generation: 2, .. }));
    assert_eq!(supervisor.load("Two").unwrap().bytes(), b"2");

    supervisor.stop();
    assert_eq!(events.recv().await.unwrap(), ReloadEvent::Stopped);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_rejects_further_use() {
    let workspace = Workspace::new().unwrap();
    workspace.file("dynamic/One.unit", b"1").unwrap();
    workspace.dir("t1").unwrap();
    let config = LoaderConfig::new()
        .with_cache_dir(workspace.token("cache"))
        .with_dynamic_classpath(workspace.token("dynamic"))
        .with_context_classpath("t1", workspace.token("t1"));
    let state = ProcessState::builder(config)
        .with_env(Env::new())
        .with_remote(false)
        .build();

    let accessor = state.default_accessor().unwrap();
    let context = state.context("t1").unwrap();
    let mut events = accessor.supervisor().subscribe();
    assert_eq!(accessor.load("One").unwrap().bytes(), b"1");
    assert_eq!(context.load("One").unwrap().bytes(), b"1");

    state.shutdown();
    state.shutdown();

    assert!(state.is_shut_down());
    assert_eq!(events.try_recv().unwrap(), ReloadEvent::Stopped);
    assert!(events.try_recv().is_err());
    assert_eq!(accessor.supervisor().status(), SupervisorStatus::Stopped);
    assert_eq!(context.supervisor().status(), SupervisorStatus::Stopped);
    assert!(matches!(accessor.load("One"), Err(LoaderError::Shutdown)));
    assert!(matches!(context.load("One"), Err(LoaderError::Shutdown)));
    assert!(matches!(state.load_code_unit("One"), Err(LoaderError::Shutdown)));
    assert!(matches!(state.load_code_unit_in("t1", "One"), Err(LoaderError::Shutdown)));
    assert!(matches!(state.context_manager(), Err(LoaderError::Shutdown)));
}
