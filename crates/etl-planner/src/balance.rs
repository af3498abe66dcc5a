//! Greedy size balancing of work items into a fixed number of buckets.
//!
//! Longest-processing-time heuristic: with items presented in descending
//! weight order, each item goes to the bucket with the smallest current load
//! (lowest index on ties). The resulting makespan is at most
//! `(4/3 - 1/(3k))` times the optimum for `k` buckets.
//!
//! Sorting is the caller's job (catalog queries already return items largest
//! first); [`sort_by_weight_descending`] is provided for everything else.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};

/// Buckets per unit of parallelism for table and index balancing.
pub const BUCKETS_PER_PARALLEL_TASK: usize = 3;

/// A unit of work with an approximate cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem<T> {
    pub id: T,
    pub weight: f64,
}

impl<T> WorkItem<T> {
    pub fn new(id: T, weight: f64) -> Self {
        Self { id, weight }
    }
}

/// A group of work items executed sequentially by one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket<T> {
    pub index: usize,
    pub items: Vec<WorkItem<T>>,
    /// Sum of item weights.
    pub load: f64,
}

impl<T> Bucket<T> {
    fn new(index: usize) -> Self {
        Self {
            index,
            items: Vec::new(),
            load: 0.0,
        }
    }

    fn push(&mut self, item: WorkItem<T>) {
        self.load += item.weight;
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Stable sort, heaviest first.
pub fn sort_by_weight_descending<T>(items: &mut [WorkItem<T>]) {
    items.sort_by(|a, b| b.weight.total_cmp(&a.weight));
}

/// Assigns work items to a fixed number of buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyLoadBalancer {
    bucket_count: usize,
}

impl GreedyLoadBalancer {
    /// Create a balancer with `bucket_count` buckets (at least 1).
    pub fn new(bucket_count: usize) -> Result<Self> {
        if bucket_count == 0 {
            return Err(PlanError::InvalidInput(
                "bucket count must be at least 1".to_string(),
            ));
        }
        Ok(Self { bucket_count })
    }

    /// Balancer for a parallelism ceiling, `3 × max_parallel_tasks` buckets.
    pub fn for_parallelism(max_parallel_tasks: usize) -> Result<Self> {
        if max_parallel_tasks == 0 {
            return Err(PlanError::InvalidInput(
                "parallelism must be at least 1".to_string(),
            ));
        }
        Self::new(max_parallel_tasks * BUCKETS_PER_PARALLEL_TASK)
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Assign every item to exactly one bucket.
    ///
    /// Always returns `bucket_count` buckets, some possibly empty. Items are
    /// placed in the order given; pass them heaviest first.
    pub fn assign<T>(&self, items: impl IntoIterator<Item = WorkItem<T>>) -> Result<Vec<Bucket<T>>> {
        let mut buckets: Vec<Bucket<T>> = (0..self.bucket_count).map(Bucket::new).collect();

        for item in items {
            if !item.weight.is_finite() || item.weight < 0.0 {
                return Err(PlanError::InvalidInput(format!(
                    "work item weight must be a finite non-negative number, got {}",
                    item.weight
                )));
            }
            // min_by keeps the first of equal minima, i.e. the lowest index
            let lightest = buckets
                .iter_mut()
                .min_by(|a, b| a.load.total_cmp(&b.load))
                .ok_or_else(|| PlanError::InvalidInput("no buckets".to_string()))?;
            lightest.push(item);
        }

        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(weights: &[f64]) -> Vec<WorkItem<usize>> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| WorkItem::new(i, *w))
            .collect()
    }

    fn ids(bucket: &Bucket<usize>) -> Vec<usize> {
        bucket.items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_rejects_zero_buckets() {
        assert!(GreedyLoadBalancer::new(0).is_err());
        assert!(GreedyLoadBalancer::for_parallelism(0).is_err());
    }

    #[test]
    fn test_for_parallelism_triples() {
        assert_eq!(GreedyLoadBalancer::for_parallelism(4).unwrap().bucket_count(), 12);
    }

    #[test]
    fn test_rejects_invalid_weights() {
        let balancer = GreedyLoadBalancer::new(2).unwrap();
        assert!(balancer.assign(items(&[1.0, -1.0])).is_err());
        assert!(balancer.assign(items(&[f64::NAN])).is_err());
        assert!(balancer.assign(items(&[f64::INFINITY])).is_err());
    }

    #[test]
    fn test_empty_input_gives_empty_buckets() {
        let buckets = GreedyLoadBalancer::new(3)
            .unwrap()
            .assign(Vec::<WorkItem<usize>>::new())
            .unwrap();
        assert_eq!(buckets.len(), 3);
        assert!(buckets.iter().all(|b| b.is_empty() && b.load == 0.0));
        assert_eq!(
            buckets.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_lpt_assignment() {
        // 7 -> b0, 5 -> b1, 4 -> b1, 3 -> b0, 2 -> b1
        let buckets = GreedyLoadBalancer::new(2)
            .unwrap()
            .assign(items(&[7.0, 5.0, 4.0, 3.0, 2.0]))
            .unwrap();
        assert_eq!(ids(&buckets[0]), vec![0, 3]);
        assert_eq!(ids(&buckets[1]), vec![1, 2, 4]);
        assert_eq!(buckets[0].load, 10.0);
        assert_eq!(buckets[1].load, 11.0);
    }

    #[test]
    fn test_ties_go_to_lowest_index() {
        let buckets = GreedyLoadBalancer::new(3)
            .unwrap()
            .assign(items(&[1.0, 1.0, 1.0, 1.0]))
            .unwrap();
        assert_eq!(ids(&buckets[0]), vec![0, 3]);
        assert_eq!(ids(&buckets[1]), vec![1]);
        assert_eq!(ids(&buckets[2]), vec![2]);
    }

    #[test]
    fn test_zero_weight_items_are_kept() {
        let buckets = GreedyLoadBalancer::new(2)
            .unwrap()
            .assign(items(&[0.0, 0.0, 0.0]))
            .unwrap();
        let total: usize = buckets.iter().map(Bucket::len).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_fewer_items_than_buckets() {
        let buckets = GreedyLoadBalancer::new(5)
            .unwrap()
            .assign(items(&[9.0, 3.0]))
            .unwrap();
        assert_eq!(buckets.iter().filter(|b| !b.is_empty()).count(), 2);
        assert!(buckets.iter().all(|b| b.len() <= 1));
    }

    #[test]
    fn test_sort_is_stable() {
        let mut work = vec![
            WorkItem::new("a", 1.0),
            WorkItem::new("b", 3.0),
            WorkItem::new("c", 1.0),
            WorkItem::new("d", 3.0),
        ];
        sort_by_weight_descending(&mut work);
        let order: Vec<&str> = work.iter().map(|w| w.id).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }
}
