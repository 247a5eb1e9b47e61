//! Process exit codes. Part of the CLI contract for CI pipelines.

pub const EXIT_SUCCESS: i32 = 0;
/// At least one case failed, or regressed with `--fail-on-regression`.
pub const EXIT_TEST_FAILURE: i32 = 1;
/// Bad test-case files, flags, judge setup or baseline store.
pub const EXIT_CONFIG_ERROR: i32 = 2;
