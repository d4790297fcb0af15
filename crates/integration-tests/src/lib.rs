//! Test registration for the sb end-to-end runner
//!
//! Tests register themselves into [`INTEGRATION_TESTS`]; the runner binary
//! collects them and ignores the cluster ones when no cluster is reachable.

// Unfortunately needed here to work with linkme
#![allow(unsafe_code)]

/// Prefix of the throwaway namespaces created by cluster tests
pub const TEST_NAMESPACE_PREFIX: &str = "sb-it-";

pub type TestFn = fn() -> color_eyre::Result<()>;

/// One registered end-to-end test
#[derive(Debug)]
pub struct IntegrationTest {
    pub name: &'static str,
    pub f: TestFn,
    /// Ignored unless `oc` is logged in
    pub requires_cluster: bool,
}

impl IntegrationTest {
    pub const fn new(name: &'static str, f: TestFn, requires_cluster: bool) -> Self {
        Self {
            name,
            f,
            requires_cluster,
        }
    }
}

/// Every test linked into the runner
#[linkme::distributed_slice]
pub static INTEGRATION_TESTS: [IntegrationTest];

/// Register a test that only needs the built `sb` binary.
///
/// ```ignore
/// fn test_sb_push_help() -> Result<()> {
///     let output = run_sb(&["push", "--help"])?;
///     output.assert_success("sb push --help");
///     Ok(())
/// }
/// integration_test!(test_sb_push_help);
/// ```
#[macro_export]
macro_rules! integration_test {
    ($fn_name:ident) => {
        ::paste::paste! {
            #[::linkme::distributed_slice($crate::INTEGRATION_TESTS)]
            static [<$fn_name:upper>]: $crate::IntegrationTest =
                $crate::IntegrationTest::new(stringify!($fn_name), $fn_name, false);
        }
    };
}

/// Register a test that talks to a cluster through `oc`. Ignored when
/// `oc whoami` fails.
///
/// ```ignore
/// fn test_status_after_init() -> Result<()> {
///     let ns = NamespaceGuard::create()?;
///     let project = TestProject::new("demo", Some(ns.name()))?;
///     run_sb_in(project.path(), &["init"])?.assert_success("sb init");
///     run_sb_in(project.path(), &["status"])?.assert_success("sb status");
///     Ok(())
/// }
/// cluster_integration_test!(test_status_after_init);
/// ```
#[macro_export]
macro_rules! cluster_integration_test {
    ($fn_name:ident) => {
        ::paste::paste! {
            #[::linkme::distributed_slice($crate::INTEGRATION_TESTS)]
            static [<$fn_name:upper>]: $crate::IntegrationTest =
                $crate::IntegrationTest::new(stringify!($fn_name), $fn_name, true);
        }
    };
}
