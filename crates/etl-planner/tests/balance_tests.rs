//! Property checks for the greedy load balancer over generated inputs.

use etl_planner::balance::{sort_by_weight_descending, GreedyLoadBalancer, WorkItem};

/// Small deterministic generator so failures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

fn generate(rng: &mut Lcg, count: usize, max_weight: u64) -> Vec<WorkItem<usize>> {
    let mut items: Vec<WorkItem<usize>> = (0..count)
        .map(|id| WorkItem::new(id, rng.below(max_weight + 1) as f64))
        .collect();
    sort_by_weight_descending(&mut items);
    items
}

/// Smallest achievable makespan, by exhaustive search.
fn optimal_makespan(weights: &[f64], buckets: usize) -> f64 {
    fn search(weights: &[f64], loads: &mut [f64], best: &mut f64) {
        let Some((&first, rest)) = weights.split_first() else {
            let makespan = loads.iter().copied().fold(0.0, f64::max);
            *best = best.min(makespan);
            return;
        };
        for i in 0..loads.len() {
            loads[i] += first;
            if loads[i] < *best {
                search(rest, loads, best);
            }
            loads[i] -= first;
            // empty buckets are interchangeable
            if loads[i] == 0.0 {
                break;
            }
        }
    }

    let mut best = f64::INFINITY;
    search(weights, &mut vec![0.0; buckets], &mut best);
    if weights.is_empty() {
        0.0
    } else {
        best
    }
}

#[test]
fn test_assignment_covers_every_item_once() {
    let mut rng = Lcg(7);
    for _ in 0..200 {
        let count = rng.below(40) as usize;
        let bucket_count = 1 + rng.below(12) as usize;
        let items = generate(&mut rng, count, 1_000);
        let total: f64 = items.iter().map(|i| i.weight).sum();

        let buckets = GreedyLoadBalancer::new(bucket_count)
            .unwrap()
            .assign(items)
            .unwrap();
        assert_eq!(buckets.len(), bucket_count);

        let mut seen: Vec<usize> = buckets
            .iter()
            .flat_map(|b| b.items.iter().map(|i| i.id))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..count).collect::<Vec<_>>());

        // integer weights, so sums are exact
        let assigned: f64 = buckets.iter().map(|b| b.load).sum();
        assert_eq!(assigned, total);
        for bucket in &buckets {
            let load: f64 = bucket.items.iter().map(|i| i.weight).sum();
            assert_eq!(bucket.load, load);
        }

        let non_empty = buckets.iter().filter(|b| !b.is_empty()).count();
        assert!(non_empty <= bucket_count.min(count));
    }
}

#[test]
fn test_assignment_is_deterministic() {
    let mut rng = Lcg(11);
    for _ in 0..50 {
        let items = generate(&mut rng, 30, 500);
        let balancer = GreedyLoadBalancer::new(5).unwrap();
        let first = balancer.assign(items.clone()).unwrap();
        let second = balancer.assign(items).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_makespan_within_lpt_bound_of_optimum() {
    let mut rng = Lcg(42);
    for _ in 0..300 {
        let count = 1 + rng.below(8) as usize;
        let bucket_count = 1 + rng.below(3) as usize;
        let items = generate(&mut rng, count, 50);
        let weights: Vec<f64> = items.iter().map(|i| i.weight).collect();

        let buckets = GreedyLoadBalancer::new(bucket_count)
            .unwrap()
            .assign(items)
            .unwrap();
        let makespan = buckets.iter().map(|b| b.load).fold(0.0, f64::max);
        let optimum = optimal_makespan(&weights, bucket_count);
        let k = bucket_count as f64;
        let bound = (4.0 / 3.0 - 1.0 / (3.0 * k)) * optimum;

        assert!(
            makespan <= bound + 1e-9,
            "weights {:?}, k={}: makespan {} exceeds {} (optimum {})",
            weights,
            bucket_count,
            makespan,
            bound,
            optimum
        );
    }
}

#[test]
fn test_makespan_never_below_lower_bounds() {
    let mut rng = Lcg(3);
    for _ in 0..100 {
        let items = generate(&mut rng, 25, 200);
        let heaviest = items.first().map(|i| i.weight).unwrap_or(0.0);
        let total: f64 = items.iter().map(|i| i.weight).sum();
        let buckets = GreedyLoadBalancer::new(4).unwrap().assign(items).unwrap();
        let makespan = buckets.iter().map(|b| b.load).fold(0.0, f64::max);
        assert!(makespan >= heaviest);
        assert!(makespan >= total / 4.0);
    }
}

#[test]
fn test_tight_lpt_instance() {
    // classic worst case for k = 2: LPT gives 7, the optimum is 6
    let items: Vec<WorkItem<usize>> = [3.0, 3.0, 2.0, 2.0, 2.0]
        .into_iter()
        .enumerate()
        .map(|(id, w)| WorkItem::new(id, w))
        .collect();
    let buckets = GreedyLoadBalancer::new(2).unwrap().assign(items).unwrap();
    let makespan = buckets.iter().map(|b| b.load).fold(0.0, f64::max);
    assert_eq!(makespan, 7.0);
    assert_eq!(optimal_makespan(&[3.0, 3.0, 2.0, 2.0, 2.0], 2), 6.0);
    assert!(makespan <= (4.0 / 3.0 - 1.0 / 6.0) * 6.0 + 1e-9);
}
