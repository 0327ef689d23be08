#![allow(clippy::needless_doctest_main)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Entry point and test attributes for heapros.

mod entry;
mod parse;

/// Runs the marked function as the root coroutine of a fresh `Runtime`.
///
/// The function body becomes the root coroutine. Once the run is over the
/// process exits with the code of the run's `Outcome`: the value passed to
/// `heapros::exit`, or `0` when every coroutine ran out of work.
///
/// Note: this macro targets small programs. For anything else, build the
/// runtime yourself with `heapros::runtime::Builder`.
///
/// # Options
///
/// * `stack_size`: size in bytes of the execution stack. Must be a power of
///   two, at least 16 KiB.
/// * `max_coroutines`: how many coroutines may be alive at once.
///
/// # Function arguments
///
/// Arguments, a return value, and `async` are not allowed.
///
/// # Usage
///
/// ```no_run
/// #[heapros::main]
/// fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// Equivalent code not using `#[heapros::main]`
///
/// ```no_run
/// fn main() {
///     let outcome = heapros::runtime::Builder::new()
///         .try_build()
///         .unwrap()
///         .run(|| {
///             println!("Hello world");
///         })
///         .unwrap();
///
///     std::process::exit(outcome.code());
/// }
/// ```
///
/// ## Configure the runtime
///
/// ```no_run
/// #[heapros::main(stack_size = 65536, max_coroutines = 8)]
/// fn main() {
///     println!("Hello world");
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Runs the marked test function as the root coroutine of its own `Runtime`.
///
/// Every test gets a fresh runtime. The value returned by the function is
/// handed back to the test harness, so `Result` returning tests work as
/// usual. The test fails if the root coroutine never returns, for example
/// because some coroutine called `heapros::exit`.
///
/// Accepts the same options as `#[heapros::main]`.
///
/// # Usage
///
/// ```no_run
/// #[heapros::test]
/// fn my_test() {
///     let pid = heapros::spawn(|| {}).unwrap();
///     assert_eq!(pid.as_u64(), 2);
/// }
/// ```
///
/// Equivalent code not using `#[heapros::test]`
///
/// ```no_run
/// #[test]
/// fn my_test() {
///     heapros::runtime::Builder::new()
///         .try_build()
///         .unwrap()
///         .run(|| {
///             let pid = heapros::spawn(|| {}).unwrap();
///             assert_eq!(pid.as_u64(), 2);
///         })
///         .unwrap();
/// }
/// ```
///
/// ### Configure the runtime
///
/// ```no_run
/// #[heapros::test(max_coroutines = 2)]
/// fn my_test() {
///     assert!(heapros::spawn(|| {}).is_ok());
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
