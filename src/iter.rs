// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Iterator adaptor to run a [`ParallelMap`] in method-call position.

use crate::cancel::CancellationToken;
use crate::error::Error;
use crate::map::ParallelMap;

/// Extension trait to transform the items of a collection in parallel.
///
/// ```
/// # use parmap::prelude::*;
/// # use parmap::{CancellationToken, ParallelMapBuilder, WorkerCount};
/// let parallel_map = ParallelMapBuilder {
///     num_workers: WorkerCount::try_from(3).unwrap(),
///     ..Default::default()
/// }
/// .build()
/// .unwrap();
///
/// let lengths = ["a", "bb", "ccc"]
///     .try_par_map(&parallel_map, &CancellationToken::new(), |_, s| {
///         Ok::<_, std::convert::Infallible>(s.len())
///     })
///     .unwrap();
/// assert_eq!(lengths, [1, 2, 3]);
/// ```
pub trait ParallelMapExt: IntoIterator
where
    Self::IntoIter: ExactSizeIterator + Send,
    Self::Item: Send,
{
    /// Transforms every item on the given [`ParallelMap`], returning the
    /// outputs in order. See [`ParallelMap::run()`] for the error and panic
    /// semantics.
    fn try_par_map<R, E, F>(
        self,
        parallel_map: &ParallelMap,
        cancel: &CancellationToken,
        transform: F,
    ) -> Result<Vec<R>, Error<E>>
    where
        R: Send,
        E: Send,
        F: Fn(&CancellationToken, Self::Item) -> Result<R, E> + Sync;
}

impl<I> ParallelMapExt for I
where
    I: IntoIterator,
    I::IntoIter: ExactSizeIterator + Send,
    I::Item: Send,
{
    fn try_par_map<R, E, F>(
        self,
        parallel_map: &ParallelMap,
        cancel: &CancellationToken,
        transform: F,
    ) -> Result<Vec<R>, Error<E>>
    where
        R: Send,
        E: Send,
        F: Fn(&CancellationToken, I::Item) -> Result<R, E> + Sync,
    {
        parallel_map.run(cancel, self, transform)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::{ParallelMapBuilder, WorkerCount};
    use std::collections::VecDeque;

    fn parallel_map(num_workers: usize) -> ParallelMap {
        ParallelMapBuilder {
            num_workers: WorkerCount::try_from(num_workers).unwrap(),
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn test_vec() {
        let input = (0..100).collect::<Vec<u64>>();
        let output = input
            .try_par_map(&parallel_map(4), &CancellationToken::new(), |_, x| {
                Ok::<_, String>(x + 1)
            })
            .unwrap();
        assert_eq!(output, (1..=100).collect::<Vec<u64>>());
    }

    #[test]
    fn test_borrowed_slice() {
        let input = vec!["foo".to_owned(), "bar".to_owned(), "baz".to_owned()];
        let output = input
            .iter()
            .try_par_map(&parallel_map(2), &CancellationToken::new(), |_, s| {
                Ok::<_, String>(s.to_uppercase())
            })
            .unwrap();
        assert_eq!(output, ["FOO", "BAR", "BAZ"]);
        // The input is still usable.
        assert_eq!(input.len(), 3);
    }

    #[test]
    fn test_vec_deque() {
        let input = (0..10).collect::<VecDeque<i32>>();
        let output = input
            .try_par_map(&parallel_map(3), &CancellationToken::new(), |_, x| {
                Ok::<_, String>(-x)
            })
            .unwrap();
        assert_eq!(output, (0..10).map(|x| -x).collect::<Vec<i32>>());
    }

    #[test]
    fn test_error() {
        let error = (0..10)
            .try_par_map(&parallel_map(3), &CancellationToken::new(), |_, x| {
                if x == 7 {
                    Err(format!("cannot process {x}"))
                } else {
                    Ok(x)
                }
            })
            .unwrap_err();
        assert_eq!(error.into_transform().unwrap(), "cannot process 7");
    }
}
