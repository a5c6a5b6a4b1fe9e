use std::cmp::Ordering;

/// a macro to declare simple Vec<String>
#[macro_export]
macro_rules! string_vec {
    ($($x:expr),*) => {
        vec![$($x.into()),*]
    };
}

/// Assigns 1-based ranks to `values`, averaging over ties (midranks).
/// Returned ranks are in the same order as the input.
pub fn rank_with_ties(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| match values[a].partial_cmp(&values[b]) {
        Some(ordering) => ordering,
        None => Ordering::Equal,
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let start = i;
        while i + 1 < order.len() && values[order[i]] == values[order[i + 1]] {
            i += 1;
        }
        // average of the 1-based positions start+1 ..= i+1
        let rank = (start + i + 2) as f64 / 2.0;
        for j in start..=i {
            ranks[order[j]] = rank;
        }
        i += 1;
    }

    ranks
}

/// Mean and sample standard deviation (n-1 denominator).
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| match a.partial_cmp(b) {
        Some(ordering) => ordering,
        None => Ordering::Equal,
    });
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_with_ties_no_ties() {
        let ranks = rank_with_ties(&[10.0, 30.0, 20.0]);
        assert_eq!(ranks, vec![1.0, 3.0, 2.0], "ranks should follow value order");
    }

    #[test]
    fn test_rank_with_ties_midranks() {
        // 5.0 occupies positions 2 and 3, so both get rank 2.5
        let ranks = rank_with_ties(&[5.0, 1.0, 5.0, 9.0]);
        assert_eq!(ranks, vec![2.5, 1.0, 2.5, 4.0]);
    }

    #[test]
    fn test_rank_with_ties_all_equal() {
        let ranks = rank_with_ties(&[2.0, 2.0, 2.0]);
        assert_eq!(
            ranks,
            vec![2.0, 2.0, 2.0],
            "a fully tied vector should collapse to the middle rank"
        );
    }

    #[test]
    fn test_mean_and_std() {
        let (mean, sd) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((sd - 2.13809).abs() < 1e-4, "sample sd was {}", sd);
    }

    #[test]
    fn test_mean_and_std_single_value() {
        let (mean, sd) = mean_and_std(&[3.5]);
        assert_eq!(mean, 3.5);
        assert_eq!(sd, 0.0, "a single observation has no spread");
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
