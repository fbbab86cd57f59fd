//! Implementation of a basic linear space trait.
//!
//! The main interface is `Lin`, implemented for a vector of real numbers
//! `Rn<F>`, for `ndarray::Array1<F>` and for the scalars `f32` and `f64`.
//! The minimizer only ever talks to its points and gradients through this
//! trait, so any of these types can be used as the search space.
//!
//! ```rust
//! use fmincg::lin::{Lin, Rn};
//!
//! let x = Rn::new(vec![1., 2.]);
//! let y = Rn::new(vec![2., -3.]);
//!
//! assert_eq!(x.dot(&y), -4.);
//! assert_eq!(x.dimension(), 2);
//! assert_eq!(Rn::new(vec![3., -1.]), x.clone() + y);
//! assert_eq!(Rn::new(vec![2., 4.]), x * 2.);
//! ```
use ndarray::{Array1, Zip};
use num_traits::{Float, One, Zero};
use std::ops::{Add, Deref, DerefMut, Mul};

/// Trait defining basic operations for an element of a linear space.
///
/// The focus is on operations _in place_: methods that return a `Lin` object
/// modify the object in place.
pub trait Lin {
    /// Scalars for this linear space.
    type F: Float;

    /// Dot product (inner product).
    fn dot(&self, other: &Self) -> Self::F;

    /// Multiplication by a constant.
    fn scale(&mut self, a: Self::F) -> &mut Self;

    /// Adds a vector multiplied by a constant to this vector.
    fn ray_to(&mut self, other: &Self, t: Self::F) -> &mut Self;

    /// Return the origin of the vector space to which self belongs too.
    fn origin(&self) -> Self;

    /// Number of coordinates.
    fn dimension(&self) -> usize;

    /// Mutable access to the `i`-th coordinate.
    ///
    /// Panics if `i >= self.dimension()`.
    fn component_mut(&mut self, i: usize) -> &mut Self::F;

    /// `true` if no coordinate is NaN or infinite.
    fn all_finite(&self) -> bool;

    /// Norm of the vector.
    fn norm(&self) -> Self::F {
        self.norm_squared().sqrt()
    }

    /// Square of the norm.
    fn norm_squared(&self) -> Self::F {
        self.dot(self)
    }

    /// Distance between two vectors.
    fn dist(&self, other: &Self) -> Self::F;

    /// Creates a linear combination `a * self + b * other`.
    fn combine(&mut self, a: Self::F, other: &Self, b: Self::F) -> &mut Self {
        self.scale(a).ray_to(other, b)
    }

    /// Replaces this vector by `-other`.
    fn negate_from(&mut self, other: &Self) -> &mut Self {
        self.combine(Self::F::zero(), other, -Self::F::one())
    }
}

/// An implementation of the Lin trait: an n-dimensional real vector.
///
/// Backed by a `Vec<F>`, where `F` is `Float`.
#[derive(Clone, Debug, PartialEq)]
pub struct Rn<F: Float> {
    vec: Vec<F>,
}

impl<F: Float> Rn<F> {
    pub fn new(v: Vec<F>) -> Self {
        Rn { vec: v }
    }
}

impl<F: Float> From<Vec<F>> for Rn<F> {
    fn from(v: Vec<F>) -> Self {
        Rn::new(v)
    }
}

impl<F: Float> Deref for Rn<F> {
    type Target = Vec<F>;

    fn deref(&self) -> &Vec<F> {
        &self.vec
    }
}

impl<F: Float> DerefMut for Rn<F> {
    fn deref_mut(&mut self) -> &mut Vec<F> {
        &mut self.vec
    }
}

impl<F: Float> Mul<F> for Rn<F> {
    type Output = Rn<F>;

    fn mul(mut self, other: F) -> Self {
        self.scale(other);
        self
    }
}

impl<F: Float> Add for Rn<F> {
    type Output = Rn<F>;

    fn add(mut self, other: Self) -> Self {
        self.ray_to(&other, F::one());
        self
    }
}

impl<F: Float> Lin for Rn<F> {
    type F = F;

    fn dist(&self, other: &Self) -> Self::F {
        assert_eq!(self.len(), other.len());
        self.iter()
            .zip(other.iter())
            .fold(Self::F::zero(), |sum, (&x, &y)| sum + (x - y).powi(2))
            .sqrt()
    }

    fn dot(&self, other: &Self) -> Self::F {
        assert_eq!(self.len(), other.len());
        self.iter()
            .zip(other.iter())
            .fold(Self::F::zero(), |sum, (&x, &y)| sum + x * y)
    }

    fn scale(&mut self, a: Self::F) -> &mut Self {
        for x in self.iter_mut() {
            *x = *x * a;
        }
        self
    }

    fn combine(&mut self, a: Self::F, other: &Self, b: Self::F) -> &mut Self {
        assert_eq!(self.len(), other.len());
        for (x, y) in self.iter_mut().zip(other.iter()) {
            *x = *x * a + *y * b;
        }
        self
    }

    fn ray_to(&mut self, other: &Self, b: Self::F) -> &mut Self {
        assert_eq!(self.len(), other.len());
        for (x, y) in self.iter_mut().zip(other.iter()) {
            *x = *x + *y * b;
        }
        self
    }

    fn origin(&self) -> Self {
        Rn::new(vec![Self::F::zero(); self.len()])
    }

    fn dimension(&self) -> usize {
        self.len()
    }

    fn component_mut(&mut self, i: usize) -> &mut Self::F {
        &mut self.vec[i]
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|x| x.is_finite())
    }
}

// `ndarray` vectors, so that callers already holding their parameters in an
// `Array1` do not need to copy them into an `Rn`.
impl<F: Float> Lin for Array1<F> {
    type F = F;

    fn dist(&self, other: &Self) -> Self::F {
        assert_eq!(self.len(), other.len());
        self.iter()
            .zip(other.iter())
            .fold(F::zero(), |sum, (&x, &y)| sum + (x - y).powi(2))
            .sqrt()
    }

    fn dot(&self, other: &Self) -> Self::F {
        assert_eq!(self.len(), other.len());
        self.iter()
            .zip(other.iter())
            .fold(F::zero(), |sum, (&x, &y)| sum + x * y)
    }

    fn scale(&mut self, a: Self::F) -> &mut Self {
        self.mapv_inplace(|x| x * a);
        self
    }

    fn combine(&mut self, a: Self::F, other: &Self, b: Self::F) -> &mut Self {
        assert_eq!(self.len(), other.len());
        Zip::from(&mut *self)
            .and(other)
            .for_each(|x, &y| *x = *x * a + y * b);
        self
    }

    fn ray_to(&mut self, other: &Self, b: Self::F) -> &mut Self {
        assert_eq!(self.len(), other.len());
        Zip::from(&mut *self)
            .and(other)
            .for_each(|x, &y| *x = *x + y * b);
        self
    }

    fn origin(&self) -> Self {
        Array1::from_elem(self.len(), F::zero())
    }

    fn dimension(&self) -> usize {
        self.len()
    }

    fn component_mut(&mut self, i: usize) -> &mut Self::F {
        &mut self[i]
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|x| x.is_finite())
    }
}

// Trivial implementation of `Lin` for a floating point number as an element
// of a one dimensional linear space over itself.
macro_rules! impl_lin_for_scalar {
    ($($t:ty),*) => {$(
        impl Lin for $t {
            type F = $t;

            fn dot(&self, other: &Self) -> Self::F {
                *self * *other
            }

            fn scale(&mut self, a: Self::F) -> &mut Self {
                *self *= a;
                self
            }

            fn combine(&mut self, a: Self::F, other: &Self, b: Self::F) -> &mut Self {
                *self = *self * a + *other * b;
                self
            }

            fn ray_to(&mut self, other: &Self, b: Self::F) -> &mut Self {
                *self += *other * b;
                self
            }

            fn origin(&self) -> Self {
                0.
            }

            fn dimension(&self) -> usize {
                1
            }

            fn component_mut(&mut self, i: usize) -> &mut Self::F {
                assert_eq!(i, 0, "a scalar has a single component");
                self
            }

            fn all_finite(&self) -> bool {
                self.is_finite()
            }

            fn dist(&self, other: &Self) -> Self::F {
                (*self - *other).abs()
            }

            fn norm(&self) -> Self::F {
                self.abs()
            }
        }
    )*};
}

impl_lin_for_scalar!(f32, f64);
