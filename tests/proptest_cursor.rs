//! Property tests for cursor arithmetic over local parts

use pcontainers::container::{Cursor, IndexedPart};
use proptest::prelude::*;

fn parts(lens: &[usize]) -> Vec<IndexedPart<usize>> {
    let mut offset = 0;
    lens.iter()
        .enumerate()
        .map(|(id, &len)| {
            let part = IndexedPart::new(id, offset, (offset..offset + len).collect());
            offset += len;
            part
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Iteration visits every local element once, in index order
    #[test]
    fn cursor_covers_all_elements(lens in prop::collection::vec(0usize..5, 0..10)) {
        let parts = parts(&lens);
        let total: usize = lens.iter().sum();
        let visited: Vec<usize> = Cursor::begin(&parts).copied().collect();
        prop_assert_eq!(visited, (0..total).collect::<Vec<usize>>());
        prop_assert_eq!(Cursor::begin(&parts) + total, Cursor::end(&parts));
    }

    /// *(it + n) is the element at i + n, and (it + n) - it == n
    #[test]
    fn cursor_arithmetic_is_consistent(
        lens in prop::collection::vec(0usize..5, 1..10),
        i in any::<prop::sample::Index>(),
        n in any::<prop::sample::Index>(),
    ) {
        let parts = parts(&lens);
        let total: usize = lens.iter().sum();
        let i = i.index(total + 1);
        let n = n.index(total - i + 1);

        let it = Cursor::begin(&parts) + i;
        let moved = it + n;
        prop_assert_eq!(moved - it, n as isize);
        prop_assert_eq!(moved.local_index(), i + n);
        if i + n < total {
            prop_assert_eq!(moved.get(), Some(i + n));
        } else {
            prop_assert!(moved.is_end());
        }
        prop_assert_eq!(moved - n, it);
        prop_assert!(moved.checked_add(total - i - n + 1).is_none());
    }
}
