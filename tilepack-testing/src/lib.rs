//! Testing utilities for the tilepack crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Runs a test function over a table of cases.
///
/// Each case is run even if an earlier one fails. Once all cases have run,
/// this panics if any failed, listing the debug representation of each
/// failing case. Packing tests are usually parametrized over shapes, so
/// seeing every failing shape at once is more useful than stopping at the
/// first.
///
/// ```
/// use tilepack_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     rows: usize,
///     padded: usize,
/// }
///
/// let cases = [
///     Case { rows: 3, padded: 4 },
///     Case { rows: 8, padded: 8 },
/// ];
///
/// cases.test_each(|&Case { rows, padded }| {
///     assert_eq!(rows.next_multiple_of(4), padded);
/// });
/// ```
///
/// Cases and anything captured by the test function must be unwind safe.
/// Values with interior mutability should be created inside the test
/// function, or wrapped in [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Call `test` with each case by value.
    ///
    /// The debug representation of each case is captured before the test
    /// function runs, so that it can be reported if the test fails.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<String> = self
            .into_iter()
            .filter_map(|case| {
                let case_str = format!("{:?}", case);
                std::panic::catch_unwind(move || test(case))
                    .is_err()
                    .then_some(case_str)
            })
            .collect();
        report_failures(&failures);
    }
}

fn report_failures<T: Debug>(failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}
