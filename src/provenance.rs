//! Attributing a failure to first-party code.
//!
//! A stack trace is scanned from its top (the innermost call) outward for the first frame
//! belonging to a registered component. The registry is an immutable snapshot that is replaced
//! as a whole when the component source is rescanned.

use crate::internal_logs::notifier_debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, PoisonError, RwLock},
};

static NUMBERED_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+:\s+(?P<symbol>\S.*?)\s*$").expect("static regex is valid"));
static AT_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at\s+(?P<symbol>\S.*?)\s*$").expect("static regex is valid"));
static SYMBOL_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"::h[0-9a-f]{16}$").expect("static regex is valid"));

/// Where a failure originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    component: String,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
}

impl Provenance {
    /// Create a provenance.
    pub fn new(
        component: impl Into<String>,
        version: impl Into<String>,
        method: Option<String>,
    ) -> Self {
        Provenance {
            component: component.into(),
            version: version.into(),
            method,
        }
    }

    /// Component name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Component version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Method, if known.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }
}

/// A first-party component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Name as it appears in stack frames. For Rust crates `-` and `_` are interchangeable.
    pub name: String,
    /// Version.
    pub version: String,
}

impl Component {
    /// Create a component.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Component {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Discovers the first-party components of the running process.
///
/// Scanned once when the registry is created and again whenever a stack frame names a component
/// that is not registered, so that components loaded later are picked up.
pub trait ComponentSource: Send + Sync + Debug {
    /// List all first-party components known right now.
    fn scan(&self) -> Vec<Component>;
}

/// A fixed list of components.
#[derive(Debug, Clone, Default)]
pub struct StaticComponents(pub Vec<Component>);

impl ComponentSource for StaticComponents {
    fn scan(&self) -> Vec<Component> {
        self.0.clone()
    }
}

/// Registry of first-party component names and versions.
#[derive(Debug)]
pub struct ComponentRegistry {
    snapshot: RwLock<Arc<HashMap<String, String>>>,
    seed: Vec<Component>,
    source: Option<Arc<dyn ComponentSource>>,
}

impl ComponentRegistry {
    /// Create a registry from a fixed list and an optional source.
    pub fn new(seed: Vec<Component>, source: Option<Arc<dyn ComponentSource>>) -> Self {
        let snapshot = build_snapshot(&seed, source.as_deref());
        ComponentRegistry {
            snapshot: RwLock::new(Arc::new(snapshot)),
            seed,
            source,
        }
    }

    fn snapshot(&self) -> Arc<HashMap<String, String>> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(&normalize(name))
    }

    /// Version of a registered component.
    pub fn version(&self, name: &str) -> Option<String> {
        self.snapshot().get(&normalize(name)).cloned()
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no component is registered.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Rescan the source and replace the snapshot.
    pub fn refresh(&self) {
        let snapshot = Arc::new(build_snapshot(&self.seed, self.source.as_deref()));
        notifier_debug!(components = snapshot.len(), "component registry refreshed");
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Find the innermost frame of `stack_trace` that belongs to a registered component.
    ///
    /// The source is rescanned at most once per call, the first time an unregistered component
    /// shows up.
    pub fn resolve(&self, stack_trace: &str) -> Option<Provenance> {
        let mut snapshot = self.snapshot();
        let mut refreshed = self.source.is_none();
        for frame in parse_frames(stack_trace) {
            let component = normalize(&frame.component);
            if !refreshed && !snapshot.contains_key(&component) {
                self.refresh();
                snapshot = self.snapshot();
                refreshed = true;
            }
            if let Some(version) = snapshot.get(&component) {
                return Some(Provenance::new(
                    frame.component,
                    version.clone(),
                    Some(frame.symbol),
                ));
            }
        }
        None
    }
}

fn build_snapshot(
    seed: &[Component],
    source: Option<&dyn ComponentSource>,
) -> HashMap<String, String> {
    let scanned = source.map(|s| s.scan()).unwrap_or_default();
    seed.iter()
        .chain(scanned.iter())
        .map(|c| (normalize(&c.name), c.version.clone()))
        .collect()
}

fn normalize(name: &str) -> String {
    name.replace('-', "_")
}

#[derive(Debug, PartialEq, Eq)]
struct Frame {
    component: String,
    symbol: String,
}

/// Parse stack trace text into frames, innermost first.
///
/// Understands Rust backtraces (`  3: my_crate::module::function::h0123456789abcdef`) and
/// `at Component.Type.Method(...) in file:line` lines. Location lines (`at ./src/lib.rs:10:5`)
/// are skipped.
fn parse_frames(stack_trace: &str) -> Vec<Frame> {
    stack_trace
        .lines()
        .filter_map(|line| {
            if let Some(caps) = NUMBERED_FRAME.captures(line) {
                return frame_from_symbol(&caps["symbol"]);
            }
            let caps = AT_FRAME.captures(line)?;
            let symbol = &caps["symbol"];
            if !symbol.contains("::") && !symbol.contains('(') {
                return None;
            }
            let symbol = symbol.split(" in ").next().unwrap_or(symbol);
            let symbol = symbol.split('(').next().unwrap_or(symbol);
            frame_from_symbol(symbol)
        })
        .collect()
}

fn frame_from_symbol(symbol: &str) -> Option<Frame> {
    let symbol = SYMBOL_HASH.replace(symbol.trim(), "");
    let path = symbol.trim_start_matches(['<', '&']);
    let first_segment = if path.contains("::") {
        path.split("::").next()
    } else {
        path.split('.').next()
    };
    let component = first_segment?.trim();
    if component.is_empty() {
        return None;
    }
    Some(Frame {
        component: component.to_string(),
        symbol: symbol.into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const RUST_TRACE: &str = "   0: std::backtrace::Backtrace::create::h0123456789abcdef
   1: orders_core::store::save::h1111111111111111
             at ./crates/core/src/store.rs:42:9
   2: orders_web::handler::post::h2222222222222222
             at ./crates/web/src/handler.rs:17:5
   3: tokio::runtime::task::raw::poll::h3333333333333333";

    #[derive(Debug, Default)]
    struct LateComponents {
        components: Mutex<Vec<Component>>,
        scans: Mutex<usize>,
    }

    impl ComponentSource for LateComponents {
        fn scan(&self) -> Vec<Component> {
            *self.scans.lock().unwrap() += 1;
            self.components.lock().unwrap().clone()
        }
    }

    #[test]
    fn parses_rust_backtrace() {
        let frames = parse_frames(RUST_TRACE);
        let components: Vec<_> = frames.iter().map(|f| f.component.as_str()).collect();
        assert_eq!(vec!["std", "orders_core", "orders_web", "tokio"], components);
        assert_eq!("orders_core::store::save", frames[1].symbol);
    }

    #[test]
    fn parses_at_frames() {
        let trace = "   at Orders.Store.Save(Int32 id) in c:\\src\\Store.cs:line 10
   at Orders.Web.Handler.Post()
   at <orders_core::Store as Save>::save";
        let frames = parse_frames(trace);
        assert_eq!(
            vec![
                Frame {
                    component: "Orders".into(),
                    symbol: "Orders.Store.Save".into()
                },
                Frame {
                    component: "Orders".into(),
                    symbol: "Orders.Web.Handler.Post".into()
                },
                Frame {
                    component: "orders_core".into(),
                    symbol: "<orders_core::Store as Save>::save".into()
                },
            ],
            frames
        );
    }

    #[test]
    fn resolves_innermost_first_party_frame() {
        let registry = ComponentRegistry::new(
            vec![
                Component::new("orders-core", "1.4.0"),
                Component::new("orders-web", "1.4.0"),
            ],
            None,
        );
        let provenance = registry.resolve(RUST_TRACE).unwrap();
        assert_eq!("orders_core", provenance.component());
        assert_eq!("1.4.0", provenance.version());
        assert_eq!(Some("orders_core::store::save"), provenance.method());
    }

    #[test]
    fn unknown_frames_resolve_to_none() {
        let registry = ComponentRegistry::new(vec![Component::new("billing", "2.0.0")], None);
        assert_eq!(None, registry.resolve(RUST_TRACE));
        assert_eq!(None, registry.resolve(""));
    }

    #[test]
    fn refresh_picks_up_late_components() {
        let source = Arc::new(LateComponents::default());
        let registry = ComponentRegistry::new(vec![], Some(source.clone()));
        assert!(registry.is_empty());

        source
            .components
            .lock()
            .unwrap()
            .push(Component::new("orders_web", "1.5.0"));
        let provenance = registry.resolve(RUST_TRACE).unwrap();
        assert_eq!("orders_web", provenance.component());
        assert_eq!("1.5.0", provenance.version());
        assert!(registry.contains("orders-web"));
        // One scan on creation, one refresh during resolve.
        assert_eq!(2, *source.scans.lock().unwrap());
    }

    #[test]
    fn refreshes_at_most_once_per_resolve() {
        let source = Arc::new(LateComponents::default());
        let registry = ComponentRegistry::new(vec![], Some(source.clone()));
        assert_eq!(None, registry.resolve(RUST_TRACE));
        assert_eq!(2, *source.scans.lock().unwrap());
    }

    #[test]
    fn static_components_seed_the_registry() {
        let source = StaticComponents(vec![Component::new("orders_core", "1.0.0")]);
        let registry = ComponentRegistry::new(vec![], Some(Arc::new(source)));
        assert_eq!(Some("1.0.0".to_string()), registry.version("orders-core"));
        assert_eq!(1, registry.len());
    }
}
