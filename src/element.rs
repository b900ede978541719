//! The capability contract for semigroup elements, and a reference
//! implementation for transformations of a finite set.
//!
//! The enumeration engine is generic over the element type; anything
//! with an associative product, a hash consistent with equality and the
//! degree bookkeeping below can be enumerated. Concrete element
//! libraries (matrices, bipartitions, boolean matrices) plug in through
//! this trait without the core knowing their representation.

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, OnceLock};
use std::thread;

/// A member of a finitely generated semigroup.
///
/// # Contract
///
/// * [`product_inplace`](Element::product_inplace) must be associative;
/// * `Eq` and `Hash` must be consistent, and `Ord` total;
/// * [`increase_degree`](Element::increase_degree) must embed the
///   element homomorphically into a larger-degree copy of the family.
pub trait Element: Clone + Eq + Hash + Ord {
    /// Stores the product `x * y` in `self`.
    ///
    /// The `thread_id` parameter indexes any per-thread scratch space an
    /// implementation keeps; values are the contiguous small integers
    /// assigned by [`thread_id()`]. Implementations that need no
    /// scratch ignore it.
    fn product_inplace(&mut self, x: &Self, y: &Self, thread_id: usize);

    /// The degree of this element, the size parameter of its family.
    fn degree(&self) -> usize;

    /// Widens this element to degree `n`, acting as the identity on the
    /// new points. Does nothing if `n` is not larger than the current
    /// degree.
    fn increase_degree(&mut self, n: usize);

    /// The identity element of the same degree as this element.
    fn one(&self) -> Self;

    /// An upper bound on the cost of one product with this element,
    /// used to decide between sequential and parallel idempotent
    /// enumeration.
    fn complexity(&self) -> usize;

    /// Exchanges this element with `other` in place.
    fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Returns the product `x * y` as a fresh element.
    fn product(x: &Self, y: &Self, thread_id: usize) -> Self {
        let mut out = x.one();
        out.product_inplace(x, y, thread_id);
        out
    }
}

fn thread_id_registry() -> &'static Mutex<HashMap<thread::ThreadId, usize>> {
    static REGISTRY: OnceLock<Mutex<HashMap<thread::ThreadId, usize>>> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

thread_local! {
    static CACHED_THREAD_ID: Cell<Option<usize>> = Cell::new(None);
}

/// Returns the scratch slot of the calling thread.
///
/// Slots are contiguous small integers assigned process-wide in order of
/// first use, so a scratch table indexed by them can be sized to the
/// maximum number of threads ever calling into the library at once.
pub fn thread_id() -> usize {
    CACHED_THREAD_ID.with(|cached| match cached.get() {
        Some(id) => id,
        None => {
            let mut registry = thread_id_registry().lock().unwrap();
            let next = registry.len();
            let id = *registry.entry(thread::current().id()).or_insert(next);
            cached.set(Some(id));
            id
        }
    })
}

/// A transformation of the set `{0, ..., n - 1}`, the reference element
/// type of the crate.
///
/// Products compose left to right: `(x * y)` maps `i` to `y[x[i]]`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Transformation {
    images: Vec<u32>,
}

impl Transformation {
    /// Creates a transformation from its list of images.
    ///
    /// # Panics
    ///
    /// Panics if some image is not less than the degree.
    pub fn new(images: Vec<u32>) -> Self {
        let n = images.len();
        assert!(
            images.iter().all(|&x| (x as usize) < n),
            "transformation images must be less than the degree {}",
            n
        );
        Self { images }
    }

    /// The identity transformation of degree `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            images: (0..n as u32).collect(),
        }
    }

    /// The image of the point `i`.
    pub fn apply(&self, i: usize) -> usize {
        self.images[i] as usize
    }

    /// The list of images.
    pub fn images(&self) -> &[u32] {
        &self.images
    }
}

impl Element for Transformation {
    fn product_inplace(&mut self, x: &Self, y: &Self, _thread_id: usize) {
        debug_assert_eq!(x.degree(), y.degree());
        self.images.clear();
        self.images
            .extend(x.images.iter().map(|&i| y.images[i as usize]));
    }

    fn degree(&self) -> usize {
        self.images.len()
    }

    fn increase_degree(&mut self, n: usize) {
        for i in self.images.len() as u32..n as u32 {
            self.images.push(i);
        }
    }

    fn one(&self) -> Self {
        Self::identity(self.degree())
    }

    fn complexity(&self) -> usize {
        self.degree()
    }
}
