use fundep::{
    discover, discover_with, AttributeSet, CompressedRecords, Config, Error, Relation, Sampler,
};
use std::collections::{HashMap, HashSet};

macro_rules! check_width {
    ($($name:ident)*) => {
        $(
        #[test]
        fn $name() {
            check((stringify!($name).as_bytes().last().unwrap() - b'0') as usize);
        }
        )*
    }
}

check_width! {
    brute_force_over_2
    brute_force_over_3
    brute_force_over_4
    brute_force_over_5
    brute_force_over_6
    brute_force_over_7
    brute_force_over_8
}

/// Compares the engine's answer against an exhaustive search over every
/// column subset, for a few deterministic pseudo-random tables per width.
/// This covers soundness, minimality, and completeness at once.
fn check(columns: usize) {
    for seed in 0..3 {
        let table = generate_table(columns, 40, seed);
        let relation = to_relation(&table);

        let expected = brute_force(&table);
        let found: HashSet<(Vec<usize>, usize)> = discover(&relation, true, 1)
            .unwrap()
            .into_iter()
            .map(|fd| (fd.lhs.iter().collect(), fd.rhs))
            .collect();

        assert_eq!(found, expected, "columns={} seed={}", columns, seed);
    }
}

struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Rng(seed.wrapping_mul(0x9E3779B97F4A7C15) | 1)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

/// Builds a table mixing independent columns of various domain sizes with
/// columns derived from their neighbors, so that real dependencies exist.
fn generate_table(columns: usize, rows: usize, seed: u64) -> Vec<Vec<u64>> {
    let domains = [2u64, 3, 4, 8, 40];
    let mut rng = Rng::new(seed.wrapping_add(columns as u64));
    let mut table = vec![vec![0u64; columns]; rows];
    for row in 0..rows {
        for column in 0..columns {
            table[row][column] = if column >= 2 && column % 3 == 2 {
                (table[row][column - 1] + table[row][column - 2]) % 5
            } else {
                rng.next() % domains[column % domains.len()]
            };
        }
    }
    table
}

fn to_relation(table: &[Vec<u64>]) -> Relation {
    let names: Vec<String> = (0..table[0].len()).map(|c| format!("c{}", c)).collect();
    let mut relation = Relation::new(names);
    for row in table {
        let cells: Vec<String> = row.iter().map(u64::to_string).collect();
        let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
        relation.push_row(&refs);
    }
    relation
}

/// Every minimal functional dependency of the table, by checking each column
/// subset directly. Dependency is monotone in the left-hand side, so a
/// holding set is minimal iff it holds after removing no single attribute.
fn brute_force(table: &[Vec<u64>]) -> HashSet<(Vec<usize>, usize)> {
    let columns = table[0].len();
    let masks = 1usize << columns;
    let mut result = HashSet::new();

    for rhs in 0..columns {
        let mut holds = vec![false; masks];
        for mask in 0..masks {
            if mask & (1 << rhs) == 0 {
                holds[mask] = determines(table, mask, rhs);
            }
        }
        for mask in 0..masks {
            if mask & (1 << rhs) != 0 || !holds[mask] {
                continue;
            }
            let minimal =
                (0..columns).all(|a| mask & (1 << a) == 0 || !holds[mask & !(1 << a)]);
            if minimal {
                let lhs = (0..columns).filter(|a| mask & (1 << a) != 0).collect();
                result.insert((lhs, rhs));
            }
        }
    }
    result
}

fn determines(table: &[Vec<u64>], mask: usize, rhs: usize) -> bool {
    let columns = table[0].len();
    let mut seen: HashMap<Vec<u64>, u64> = HashMap::new();
    for row in table {
        let key: Vec<u64> = (0..columns)
            .filter(|c| mask & (1 << c) != 0)
            .map(|c| row[c])
            .collect();
        match seen.get(&key) {
            Some(&value) => {
                if value != row[rhs] {
                    return false;
                }
            }
            None => {
                seen.insert(key, row[rhs]);
            }
        }
    }
    true
}

#[test]
fn textbook_example() {
    let relation = Relation::from_rows(
        vec!["a", "b", "c"],
        &[
            &["1", "1", "10"],
            &["1", "1", "20"],
            &["2", "2", "10"],
            &["2", "2", "20"],
            &["3", "1", "10"],
        ],
    );
    let fds = discover(&relation, true, 1).unwrap();

    assert_eq!(fds.len(), 1);
    assert_eq!(fds[0].lhs.iter().collect::<Vec<_>>(), vec![0]);
    assert_eq!(fds[0].rhs, 1);
    // In particular: b does not determine a (b=1 maps to both a=1 and a=3),
    // and nothing involves c.
    assert!(!fds.iter().any(|fd| fd.rhs == 0));
    assert!(!fds.iter().any(|fd| fd.rhs == 2 || fd.lhs.test(2)));
}

#[test]
fn single_row_table_has_only_constant_columns() {
    let relation = Relation::from_rows(vec!["a", "b"], &[&["x", "y"]]);
    let fds = discover(&relation, true, 1).unwrap();
    // With one row, every column is determined by the empty set.
    assert_eq!(fds.len(), 2);
    assert!(fds.iter().all(|fd| fd.lhs.is_empty()));
}

#[test]
fn zero_rows_are_rejected() {
    let relation = Relation::new(vec!["a", "b"]);
    assert!(matches!(discover(&relation, true, 1), Err(Error::NoRows)));
}

#[test]
fn zero_columns_are_rejected() {
    let relation = Relation::new(Vec::<String>::new());
    assert!(matches!(discover(&relation, true, 1), Err(Error::NoColumns)));
}

#[test]
fn single_thread_runs_are_deterministic() {
    let table = generate_table(6, 40, 11);
    let relation = to_relation(&table);
    let first = discover(&relation, true, 1).unwrap();
    let second = discover(&relation, true, 1).unwrap();
    assert_eq!(first, second);
}

#[test]
fn thread_count_does_not_change_the_answer() {
    let table = generate_table(6, 40, 5);
    let relation = to_relation(&table);
    let sequential: HashSet<_> = discover(&relation, true, 1).unwrap().into_iter().collect();
    let parallel: HashSet<_> = discover(&relation, true, 3).unwrap().into_iter().collect();
    assert_eq!(sequential, parallel);
}

#[test]
fn tuning_does_not_change_the_answer() {
    let table = generate_table(5, 40, 3);
    let relation = to_relation(&table);
    let default: HashSet<_> = discover(&relation, true, 1).unwrap().into_iter().collect();
    // A cutoff that never trips makes the validator grind through every
    // level in one call; the answer must not move.
    let exhaustive: HashSet<_> = discover_with(
        &relation,
        &Config {
            validation_cutoff: f64::INFINITY,
            initial_efficiency_threshold: 0.5,
            efficiency_decay: 0.5,
            ..Config::default()
        },
    )
    .unwrap()
    .into_iter()
    .collect();
    assert_eq!(default, exhaustive);
}

#[test]
fn null_semantics_flip_results() {
    let relation = Relation::from_rows(vec!["a", "b"], &[&["", "1"], &["", "2"]]);

    // Nulls pairwise distinct: column a is all-unique, so a -> b holds
    // vacuously.
    let strict = discover(&relation, false, 1).unwrap();
    assert!(strict
        .iter()
        .any(|fd| fd.rhs == 1 && fd.lhs.iter().collect::<Vec<_>>() == vec![0]));

    // Nulls equal: the two rows share a but differ in b.
    let merged = discover(&relation, true, 1).unwrap();
    assert!(!merged.iter().any(|fd| fd.rhs == 1));
    // And a is now a constant column.
    assert!(merged.iter().any(|fd| fd.rhs == 0 && fd.lhs.is_empty()));
}

#[test]
fn sampling_is_monotone_and_sound() {
    let table = generate_table(5, 40, 7);
    let relation = to_relation(&table);
    let mut plis = relation.build_plis(true);
    let records = CompressedRecords::from_plis(&plis, relation.num_rows());

    let mut family: HashSet<AttributeSet> = HashSet::new();
    for first in 0..40 {
        for second in first + 1..40 {
            family.insert(records.agree_set(first, second));
        }
    }

    let mut sampler = Sampler::new(5, 0.01, 0.9);
    let mut cumulative: HashSet<AttributeSet> = HashSet::new();
    loop {
        let fresh = sampler.sample(&mut plis, &records, &[], None);
        if fresh.is_empty() {
            break;
        }
        for level in 0..=fresh.depth() {
            for set in fresh.level(level) {
                assert!(family.contains(set), "{:?} is not a real agree-set", set);
                assert!(cumulative.insert(set.clone()), "{:?} reported twice", set);
            }
        }
    }
}
