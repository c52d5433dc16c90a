use crate::error::SyncError;

/// Page numbers still to fetch after page 1, i.e. `2..=last_page`.
///
/// `last_page` is `total_count / page_size`, plus one page when there is a
/// remainder. Nothing remains when everything fits on the first page.
pub fn plan_remaining(total_count: i64, page_size: i64) -> Result<Vec<u32>, SyncError> {
    if total_count < 0 {
        return Err(SyncError::InvalidArgument(format!(
            "total_count must be >= 0, got {total_count}"
        )));
    }
    if page_size <= 0 {
        return Err(SyncError::InvalidArgument(format!(
            "page_size must be > 0, got {page_size}"
        )));
    }

    let last_page = last_page_number(total_count, page_size);
    let last_page = u32::try_from(last_page).map_err(|_| {
        SyncError::InvalidArgument(format!(
            "total_count {total_count} needs more than {} pages",
            u32::MAX
        ))
    })?;
    Ok((2..=last_page).collect())
}

fn last_page_number(total_count: i64, page_size: i64) -> i64 {
    let mut last_page = total_count / page_size;
    if has_remainder(total_count, page_size) {
        last_page += 1;
    }
    last_page
}

fn has_remainder(total_count: i64, page_size: i64) -> bool {
    total_count % page_size != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_adds_one_page() {
        assert_eq!(plan_remaining(250, 100).unwrap(), vec![2, 3]);
        assert_eq!(plan_remaining(350, 100).unwrap(), vec![2, 3, 4]);
        assert_eq!(plan_remaining(101, 100).unwrap(), vec![2]);
    }

    #[test]
    fn exact_multiple_adds_no_page() {
        assert_eq!(plan_remaining(300, 100).unwrap(), vec![2, 3]);
    }

    #[test]
    fn single_page_or_empty_plans_nothing() {
        assert!(plan_remaining(100, 100).unwrap().is_empty());
        assert!(plan_remaining(99, 100).unwrap().is_empty());
        assert!(plan_remaining(0, 100).unwrap().is_empty());
    }

    #[test]
    fn negative_input_is_rejected() {
        assert!(matches!(
            plan_remaining(-1, 100),
            Err(SyncError::InvalidArgument(_))
        ));
        assert!(matches!(
            plan_remaining(10, 0),
            Err(SyncError::InvalidArgument(_))
        ));
        assert!(matches!(
            plan_remaining(10, -5),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn page_count_matches_ceiling_minus_first() {
        for page_size in 1..=13i64 {
            for total in 0..=200i64 {
                let ceil = (total + page_size - 1) / page_size;
                let expected = (ceil - 1).max(0) as usize;
                let pages = plan_remaining(total, page_size).unwrap();
                assert_eq!(pages.len(), expected, "total={total} size={page_size}");
                if let Some(last) = pages.last() {
                    assert_eq!(*last as i64, ceil);
                    assert_eq!(pages[0], 2);
                }
            }
        }
    }
}
