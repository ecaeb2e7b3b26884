use std::hash::Hash;
use std::collections::HashSet;
use rand::{
    distributions::Alphanumeric,
    Rng,
    thread_rng
};

const ID_LENGTH: usize = 10;

pub fn first_duplicate<A>(iter: impl Iterator<Item=A>) -> Option<A>
where A: Eq + Hash {
    let mut set = HashSet::<A>::new();
    for a in iter {
        let old = set.replace(a);
        if let Some(old) = old {
            return Some(old);
        }
    }
    None
}

/// Random alphanumeric document id.
pub fn new_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .collect()
}
