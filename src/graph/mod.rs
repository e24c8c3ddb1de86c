/*!
The narrow interface to the external build engine, and the lazy graph
value type every pipeline composes.

The core never performs I/O while *constructing* a graph — every
`GraphState` is a pure, cheaply-cloned value (an `Arc`-backed description of
an operation and its inputs) until it is handed to [`BuildClient::solve`].
*/

pub mod error;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A lazy, reference-counted build-graph value. Two `GraphState`s that
/// describe the same operation over the same inputs are cheap to clone and
/// compare by `Arc` pointer identity for memoization at call sites; the
/// engine itself is responsible for content-addressed caching once solved.
#[derive(Clone)]
pub struct GraphState {
    inner: Arc<GraphOp>,
}

impl fmt::Debug for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphState({:?})", self.inner)
    }
}

impl GraphState {
    pub fn new(op: GraphOp) -> Self {
        Self { inner: Arc::new(op) }
    }

    pub fn op(&self) -> &GraphOp {
        &self.inner
    }

    pub fn scratch() -> Self {
        Self::new(GraphOp::Scratch)
    }
}

/// The vocabulary of filesystem operations this crate ever emits. The
/// engine interprets these; this crate never executes them.
#[derive(Debug, Clone)]
pub enum GraphOp {
    /// An empty filesystem state.
    Scratch,
    /// A literal file written into a scratch state (inline sources).
    File {
        path: String,
        contents: Vec<u8>,
        mode: u32,
    },
    /// Resolve a named input provided by the engine (a `context` source).
    Input { name: String },
    /// Resolve a container image reference, optionally running a command
    /// inside it to produce an output directory (a `dockerImage` source).
    Image {
        ref_: String,
        cmd: Option<String>,
        path: Option<String>,
    },
    /// Fetch a single file over HTTP, optionally verifying a digest.
    Http { url: String, digest: Option<String> },
    /// Clone a git ref.
    Git {
        url: String,
        git_ref: String,
        submodules: bool,
    },
    /// Apply include/exclude glob filters over `input`.
    Filter {
        input: Box<GraphState>,
        include: Vec<String>,
        exclude: Vec<String>,
    },
    /// Tar+gzip a directory state into a single named artifact.
    Tar { input: Box<GraphState>, name: String },
    /// Run a command in a worker container with mounts.
    Run {
        base: Box<GraphState>,
        command: String,
        env: BTreeMap<String, String>,
        mounts: Vec<Mount>,
        network: NetworkPolicy,
        cache_mounts: Vec<CacheMount>,
    },
    /// Merge several states into one filesystem tree.
    Merge { inputs: Vec<GraphState> },
}

#[derive(Debug, Clone)]
pub struct Mount {
    pub dest: String,
    pub source: GraphState,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPolicy {
    None,
    Host,
}

/// A persistent cache mount. `Locked` serializes concurrent users of the
/// mount; `Shared` allows concurrent use.
#[derive(Debug, Clone)]
pub struct CacheMount {
    pub id: String,
    pub dest: String,
    pub sharing: CacheSharing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSharing {
    Locked,
    Shared,
}

/// A platform tuple. The Windows pipeline keys results by the full tuple,
/// not just `os/arch`, so distinct OS versions or feature sets never
/// collide in the output map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub os_version: Option<String>,
    pub os_features: Vec<String>,
}

impl Platform {
    pub fn short_key(&self) -> String {
        format!("{}/{}", self.os, self.arch)
    }

    pub fn full_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.os,
            self.arch,
            self.os_version.as_deref().unwrap_or(""),
            self.os_features.join(",")
        )
    }
}

/// A reference to solved content in the engine's store, opaque to this
/// crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef(pub String);

#[derive(Debug, Clone)]
pub struct SolveMetadata {
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub ref_: ContentRef,
    pub metadata: SolveMetadata,
}

#[derive(Debug, Clone)]
pub struct StatInfo {
    pub mode: u32,
    pub size: u64,
    pub is_dir: bool,
}

/// A cooperative cancellation signal threaded through every suspension
/// point. Cloning shares the same underlying signal.
#[derive(Clone)]
pub struct Cancellation {
    rx: tokio::sync::watch::Receiver<bool>,
}

pub struct CancellationSource {
    tx: tokio::sync::watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> (Self, Cancellation) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (Self { tx }, Cancellation { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Race `fut` against cancellation, so every suspension point can
    /// observe and propagate the cancellation token.
    pub async fn race<T>(
        &self,
        fut: impl std::future::Future<Output = T>,
    ) -> Result<T, error::Cancelled> {
        let mut rx = self.rx.clone();
        tokio::select! {
            out = fut => Ok(out),
            _ = rx.changed() => Err(error::Cancelled),
        }
    }
}

/// A marker implemented by engine error types so `BuildClient::solve`
/// retries can distinguish a transient failure from a fatal one, without
/// this crate ever inspecting engine stdout.
pub trait RetryableEngineError {
    fn is_retryable(&self) -> bool;
}

/// The minimal client this crate depends on to talk to the build engine.
#[async_trait]
pub trait BuildClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + RetryableEngineError + 'static;

    async fn solve(&self, graph: &GraphState) -> Result<SolveResult, Self::Error>;
    async fn resolve_image(
        &self,
        ref_: &str,
        platform: &Platform,
    ) -> Result<(String, serde_json::Value), Self::Error>;
    fn inputs(&self) -> BTreeMap<String, GraphState>;
    fn build_opts(&self) -> BTreeMap<String, String>;
    async fn read_file(&self, ref_: &ContentRef, path: &str) -> Result<Vec<u8>, Self::Error>;
    async fn stat_file(&self, ref_: &ContentRef, path: &str) -> Result<StatInfo, Self::Error>;
    async fn read_dir(
        &self,
        ref_: &ContentRef,
        path: &str,
        glob: Option<&str>,
    ) -> Result<Vec<String>, Self::Error>;
    async fn warn(&self, state: &GraphState, msg: &str);
}

/// Solve with bounded retry on transient engine errors.
pub async fn solve_with_retry<C: BuildClient>(
    client: &C,
    graph: &GraphState,
    cancellation: &Cancellation,
    max_attempts: u32,
) -> Result<SolveResult, error::EngineError<C::Error>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match cancellation.race(client.solve(graph)).await {
            Err(_) => return Err(error::EngineError::Cancelled),
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(e)) if e.is_retryable() && attempt < max_attempts => continue,
            Ok(Err(e)) => return Err(error::EngineError::Engine { source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_full_key_differs_by_os_version() {
        let a = Platform {
            os: "windows".into(),
            arch: "amd64".into(),
            os_version: Some("10.0.17763.1".into()),
            os_features: vec![],
        };
        let b = Platform {
            os: "windows".into(),
            arch: "amd64".into(),
            os_version: Some("10.0.20348.1".into()),
            os_features: vec![],
        };
        assert_eq!(a.short_key(), b.short_key());
        assert_ne!(a.full_key(), b.full_key());
    }
}
