//! Canonical algebraic values.
//!
//! An [`Expr`] is a rational function: a numerator and a denominator, each a
//! multivariate [`Poly`] with exact rational coefficients. Anything that is
//! not polynomial (roots, symbolic powers, function applications, `π`) enters
//! as an opaque [`Symbol`] whose arguments are themselves canonical.
//!
//! Two expressions are equivalent when their difference reduces to zero.
//! Radicals are kept canonical so that this also holds for expressions such
//! as `x*sqrt(8)` and `2*sqrt(2)*x`: constant radicands are integers free of
//! perfect powers, constant roots of one index are merged, and single-term
//! denominators are cleared of constant roots. Variables under a root are
//! taken to be non-negative.

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use miette::Diagnostic;
use num_bigint::BigInt;
use num_integer::{Integer, Roots};
use num_rational::BigRational;
use num_traits::{One, Pow, Signed, ToPrimitive, Zero};
use thiserror::Error;

/// Integer exponents beyond this are refused rather than expanded.
pub const MAX_EXPONENT: u32 = 4096;

/// Largest polynomial a product may expand to.
pub const MAX_TERMS: usize = 10_000;

/// Primes up to this bound are pulled out of constant radicands.
const TRIAL_DIVISION_LIMIT: u32 = 1000;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum AlgebraError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0} is not a real number")]
    NotReal(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Func {
    Sqrt,
    Root,
    Abs,
    Sin,
    Cos,
    Tan,
    Cot,
    Sec,
    Csc,
    Arcsin,
    Arccos,
    Arctan,
    Sinh,
    Cosh,
    Tanh,
    Ln,
    Log,
    Exp,
}

impl Func {
    /// Maps a LaTeX command name to the function it applies, for commands that
    /// take a plain argument.
    pub fn from_command(name: &str) -> Option<Func> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "cot" => Func::Cot,
            "sec" => Func::Sec,
            "csc" => Func::Csc,
            "arcsin" => Func::Arcsin,
            "arccos" => Func::Arccos,
            "arctan" => Func::Arctan,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            "ln" => Func::Ln,
            "log" => Func::Log,
            "exp" => Func::Exp,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Sqrt => "sqrt",
            Func::Root => "root",
            Func::Abs => "abs",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Cot => "cot",
            Func::Sec => "sec",
            Func::Csc => "csc",
            Func::Arcsin => "arcsin",
            Func::Arccos => "arccos",
            Func::Arctan => "arctan",
            Func::Sinh => "sinh",
            Func::Cosh => "cosh",
            Func::Tanh => "tanh",
            Func::Ln => "ln",
            Func::Log => "log",
            Func::Exp => "exp",
        }
    }

    fn apply(&self, args: &[f64]) -> Option<f64> {
        let value = match (self, args) {
            (Func::Sqrt, [x]) => x.sqrt(),
            (Func::Root, [x, n]) => x.powf(n.recip()),
            (Func::Abs, [x]) => x.abs(),
            (Func::Sin, [x]) => x.sin(),
            (Func::Cos, [x]) => x.cos(),
            (Func::Tan, [x]) => x.tan(),
            (Func::Cot, [x]) => x.tan().recip(),
            (Func::Sec, [x]) => x.cos().recip(),
            (Func::Csc, [x]) => x.sin().recip(),
            (Func::Arcsin, [x]) => x.asin(),
            (Func::Arccos, [x]) => x.acos(),
            (Func::Arctan, [x]) => x.atan(),
            (Func::Sinh, [x]) => x.sinh(),
            (Func::Cosh, [x]) => x.cosh(),
            (Func::Tanh, [x]) => x.tanh(),
            (Func::Ln, [x]) => x.ln(),
            (Func::Log, [x]) => x.log10(),
            (Func::Log, [x, base]) => x.log(*base),
            (Func::Exp, [x]) => x.exp(),
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Symbol {
    Var(String),
    Pi,
    /// Principal `n`-th root, `n >= 2`.
    Root(Box<Expr>, u32),
    /// Power whose exponent is not a constant.
    Power(Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Symbol {
    fn mentions(&self, var: &str) -> bool {
        match self {
            Symbol::Var(name) => name == var,
            Symbol::Pi => false,
            Symbol::Root(base, _) => base.mentions(var),
            Symbol::Power(base, exponent) => base.mentions(var) || exponent.mentions(var),
            Symbol::Call(_, args) => args.iter().any(|arg| arg.mentions(var)),
        }
    }

    fn approx(&self) -> Option<f64> {
        match self {
            Symbol::Var(_) => None,
            Symbol::Pi => Some(std::f64::consts::PI),
            Symbol::Root(base, n) => {
                let base = base.approx()?;
                let root = if base < 0.0 && n % 2 == 1 {
                    -(-base).powf(f64::from(*n).recip())
                } else {
                    base.powf(f64::from(*n).recip())
                };
                root.is_finite().then_some(root)
            }
            Symbol::Power(base, exponent) => {
                let value = base.approx()?.powf(exponent.approx()?);
                value.is_finite().then_some(value)
            }
            Symbol::Call(func, args) => {
                let args = args.iter().map(Expr::approx).collect::<Option<Vec<_>>>()?;
                func.apply(&args)
            }
        }
    }
}

/// Product of symbols raised to positive integer powers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Monomial(BTreeMap<Symbol, u32>);

impl Monomial {
    fn of(symbol: Symbol, exponent: u32) -> Self {
        let mut powers = BTreeMap::new();
        if exponent > 0 {
            powers.insert(symbol, exponent);
        }
        Monomial(powers)
    }

    fn is_one(&self) -> bool {
        self.0.is_empty()
    }

    fn mul(&self, other: &Monomial) -> Monomial {
        let mut powers = self.0.clone();
        for (symbol, exponent) in &other.0 {
            *powers.entry(symbol.clone()).or_insert(0) += exponent;
        }
        Monomial(powers)
    }

    fn divides(&self, other: &Monomial) -> bool {
        self.0
            .iter()
            .all(|(symbol, exponent)| other.0.get(symbol).is_some_and(|e| e >= exponent))
    }

    /// `self / other`, assuming `other` divides `self`.
    fn quotient(&self, other: &Monomial) -> Monomial {
        let mut powers = self.0.clone();
        for (symbol, exponent) in &other.0 {
            if let Some(e) = powers.get_mut(symbol) {
                *e -= exponent;
                if *e == 0 {
                    powers.remove(symbol);
                }
            }
        }
        Monomial(powers)
    }

    /// Constant roots appear once per index with exponent 1. Other roots
    /// have an exponent below their index and coprime to it.
    fn radicals_canonical(&self) -> bool {
        let mut indices = Vec::new();
        self.0.iter().all(|(symbol, k)| match symbol {
            Symbol::Root(base, n) if base.as_constant().is_some() => {
                let fresh = !indices.contains(n);
                indices.push(*n);
                *k == 1 && fresh
            }
            Symbol::Root(_, n) => k < n && k.gcd(n) == 1,
            _ => true,
        })
    }

    fn gcd(&self, other: &Monomial) -> Monomial {
        Monomial(
            self.0
                .iter()
                .filter_map(|(symbol, exponent)| {
                    other
                        .0
                        .get(symbol)
                        .map(|e| (symbol.clone(), (*e).min(*exponent)))
                })
                .collect(),
        )
    }

    /// Lexicographic monomial order: the smallest symbol is the most
    /// significant and a larger exponent wins.
    fn lex_cmp(&self, other: &Monomial) -> Ordering {
        let mut symbols: Vec<&Symbol> = self.0.keys().chain(other.0.keys()).collect();
        symbols.sort();
        symbols.dedup();
        for symbol in symbols {
            let a = self.0.get(symbol).copied().unwrap_or(0);
            let b = other.0.get(symbol).copied().unwrap_or(0);
            if a != b {
                return a.cmp(&b);
            }
        }
        Ordering::Equal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Poly {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Poly {
    pub fn zero() -> Self {
        Poly::default()
    }

    pub fn one() -> Self {
        Poly::constant(BigRational::one())
    }

    pub fn constant(value: BigRational) -> Self {
        let mut poly = Poly::zero();
        poly.add_term(Monomial::default(), value);
        poly
    }

    fn symbol(symbol: Symbol) -> Self {
        let mut poly = Poly::zero();
        poly.add_term(Monomial::of(symbol, 1), BigRational::one());
        poly
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn as_constant(&self) -> Option<BigRational> {
        match self.terms.len() {
            0 => Some(BigRational::zero()),
            1 => self
                .terms
                .iter()
                .next()
                .filter(|(monomial, _)| monomial.is_one())
                .map(|(_, coefficient)| coefficient.clone()),
            _ => None,
        }
    }

    fn add_term(&mut self, monomial: Monomial, coefficient: BigRational) {
        if coefficient.is_zero() {
            return;
        }
        let sum = match self.terms.remove(&monomial) {
            Some(existing) => existing + coefficient,
            None => coefficient,
        };
        if !sum.is_zero() {
            self.terms.insert(monomial, sum);
        }
    }

    pub fn add(&self, other: &Poly) -> Poly {
        let mut sum = self.clone();
        for (monomial, coefficient) in &other.terms {
            sum.add_term(monomial.clone(), coefficient.clone());
        }
        sum
    }

    pub fn neg(&self) -> Poly {
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(monomial, coefficient)| (monomial.clone(), -coefficient))
                .collect(),
        }
    }

    pub fn sub(&self, other: &Poly) -> Poly {
        self.add(&other.neg())
    }

    /// Refuses products that would expand past [`MAX_TERMS`].
    pub fn mul(&self, other: &Poly) -> Result<Poly, AlgebraError> {
        let pairs = self.terms.len().saturating_mul(other.terms.len());
        if pairs > MAX_TERMS.saturating_mul(100) {
            return Err(too_many_terms());
        }
        let mut product = Poly::zero();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &other.terms {
                product.add_term(m1.mul(m2), c1 * c2);
            }
        }
        if product.terms.len() > MAX_TERMS {
            return Err(too_many_terms());
        }
        Ok(product)
    }

    fn scale(&self, factor: &BigRational) -> Poly {
        let mut scaled = Poly::zero();
        for (monomial, coefficient) in &self.terms {
            scaled.add_term(monomial.clone(), coefficient * factor);
        }
        scaled
    }

    fn mul_monomial(&self, monomial: &Monomial, coefficient: &BigRational) -> Poly {
        let mut product = Poly::zero();
        for (m, c) in &self.terms {
            product.add_term(m.mul(monomial), c * coefficient);
        }
        product
    }

    pub fn pow(&self, exponent: u32) -> Result<Poly, AlgebraError> {
        let mut result = Poly::one();
        let mut base = self.clone();
        let mut exponent = exponent;
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result.mul(&base)?;
            }
            exponent >>= 1;
            if exponent > 0 {
                base = base.mul(&base)?;
            }
        }
        Ok(result)
    }

    fn leading(&self) -> Option<(&Monomial, &BigRational)> {
        self.terms.iter().max_by(|(a, _), (b, _)| a.lex_cmp(b))
    }

    /// Multivariate division; `Some(quotient)` only when the remainder is zero.
    fn div_exact(&self, divisor: &Poly) -> Option<Poly> {
        let (lead_m, lead_c) = divisor.leading()?;
        let mut rest = self.clone();
        let mut quotient = Poly::zero();
        while let Some((m, c)) = rest.leading() {
            if !lead_m.divides(m) {
                return None;
            }
            let factor_m = m.quotient(lead_m);
            let factor_c = c / lead_c;
            rest = rest.sub(&divisor.mul_monomial(&factor_m, &factor_c));
            quotient.add_term(factor_m, factor_c);
        }
        Some(quotient)
    }

    /// Positive rational `g` such that `self / g` has coprime integer
    /// coefficients.
    fn content(&self) -> BigRational {
        let mut numer = BigInt::zero();
        let mut denom = BigInt::one();
        for coefficient in self.terms.values() {
            numer = numer.gcd(coefficient.numer());
            denom = denom.lcm(coefficient.denom());
        }
        if numer.is_zero() {
            return BigRational::one();
        }
        BigRational::new(numer, denom)
    }

    /// For a single-term polynomial with constant roots, the factor that
    /// clears them.
    fn radical_conjugate(&self) -> Option<Poly> {
        if self.terms.len() != 1 {
            return None;
        }
        let (monomial, _) = self.terms.iter().next()?;
        let powers: BTreeMap<Symbol, u32> = monomial
            .0
            .keys()
            .filter_map(|symbol| match symbol {
                Symbol::Root(base, n) if base.as_constant().is_some() => {
                    Some((symbol.clone(), n - 1))
                }
                _ => None,
            })
            .collect();
        if powers.is_empty() {
            return None;
        }
        let mut conjugate = Poly::zero();
        conjugate.add_term(Monomial(powers), BigRational::one());
        Some(conjugate)
    }

    fn monomial_content(&self) -> Monomial {
        let mut terms = self.terms.keys();
        let Some(first) = terms.next() else {
            return Monomial::default();
        };
        terms.fold(first.clone(), |gcd, m| gcd.gcd(m))
    }

    fn divide_monomial(&self, monomial: &Monomial) -> Poly {
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.quotient(monomial), c.clone()))
                .collect(),
        }
    }

    fn mentions(&self, var: &str) -> bool {
        self.terms
            .keys()
            .any(|m| m.0.keys().any(|symbol| symbol.mentions(var)))
    }

    fn approx(&self) -> Option<f64> {
        let mut sum = 0.0;
        for (monomial, coefficient) in &self.terms {
            let mut term = coefficient.to_f64()?;
            for (symbol, exponent) in &monomial.0 {
                term *= symbol.approx()?.powi(i32::try_from(*exponent).ok()?);
            }
            sum += term;
        }
        sum.is_finite().then_some(sum)
    }

    /// Replaces the variable `var` by `value`. Symbols that mention `var`
    /// inside their arguments are not rewritten and make this fail.
    fn substitute(&self, var: &str, value: &Expr) -> Result<Expr, AlgebraError> {
        let target = Symbol::Var(var.to_string());
        let mut result = Expr::zero();
        for (monomial, coefficient) in &self.terms {
            let mut term = Expr::constant(coefficient.clone());
            for (symbol, exponent) in &monomial.0 {
                let factor = if *symbol == target {
                    value.pow_int(i64::from(*exponent))?
                } else if symbol.mentions(var) {
                    return Err(AlgebraError::Unsupported(format!(
                        "substituting `{var}` inside {symbol}"
                    )));
                } else {
                    Expr::symbol(symbol.clone()).pow_int(i64::from(*exponent))?
                };
                term = term.mul(&factor)?;
            }
            result = result.add(&term)?;
        }
        Ok(result)
    }

    /// Antiderivative in `var`, which must occur only as a plain variable.
    fn integrate(&self, var: &str) -> Result<Poly, AlgebraError> {
        let target = Symbol::Var(var.to_string());
        let mut result = Poly::zero();
        for (monomial, coefficient) in &self.terms {
            let mut powers = monomial.0.clone();
            if powers
                .keys()
                .any(|symbol| *symbol != target && symbol.mentions(var))
            {
                return Err(AlgebraError::Unsupported(format!(
                    "integrand is not polynomial in `{var}`"
                )));
            }
            let k = powers.remove(&target).unwrap_or(0) + 1;
            powers.insert(target.clone(), k);
            result.add_term(
                Monomial(powers),
                coefficient / BigRational::from_integer(BigInt::from(k)),
            );
        }
        Ok(result)
    }

    /// Rewrites radicals into canonical form, or returns `None` if they
    /// already are. Powers `root(b, n)^k` with `k >= n` give up whole powers
    /// of `b`, and constant roots of one index merge into one root.
    fn collapse_radicals(&self) -> Result<Option<Expr>, AlgebraError> {
        if self.terms.keys().all(Monomial::radicals_canonical) {
            return Ok(None);
        }

        let mut result = Expr::zero();
        for (monomial, coefficient) in &self.terms {
            let mut kept: BTreeMap<Symbol, u32> = BTreeMap::new();
            let mut constants: BTreeMap<u32, BigRational> = BTreeMap::new();
            let mut term = Expr::constant(coefficient.clone());
            for (symbol, k) in &monomial.0 {
                match symbol {
                    Symbol::Root(base, n) => match base.as_constant() {
                        Some(c) => {
                            let product = constants.entry(*n).or_insert_with(BigRational::one);
                            *product *= rational_pow(&c, *k);
                        }
                        None => {
                            if k >= n {
                                term = term.mul(&base.pow_int(i64::from(k / n))?)?;
                            }
                            let rest = k % n;
                            if rest > 0 {
                                let g = rest.gcd(n);
                                let reduced = Symbol::Root(base.clone(), n / g);
                                *kept.entry(reduced).or_insert(0) += rest / g;
                            }
                        }
                    },
                    _ => {
                        *kept.entry(symbol.clone()).or_insert(0) += k;
                    }
                }
            }
            for (n, product) in &constants {
                term = term.mul(&constant_root(product, *n)?)?;
            }
            let mut rest = Poly::zero();
            rest.add_term(Monomial(kept), BigRational::one());
            term = term.mul(&Expr::from_poly(rest))?;
            result = result.add(&term)?;
        }
        Ok(Some(result))
    }
}

fn too_many_terms() -> AlgebraError {
    AlgebraError::Unsupported(format!("expansion exceeds {MAX_TERMS} terms"))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expr {
    num: Poly,
    den: Poly,
}

impl Expr {
    /// Builds `num / den` in canonical form.
    pub fn new(num: Poly, den: Poly) -> Result<Expr, AlgebraError> {
        if den.is_zero() {
            return Err(AlgebraError::DivisionByZero);
        }
        if num.is_zero() {
            return Ok(Expr::zero());
        }

        let collapsed_num = num.collapse_radicals()?;
        let collapsed_den = den.collapse_radicals()?;
        if collapsed_num.is_some() || collapsed_den.is_some() {
            let num = collapsed_num.unwrap_or_else(|| Expr::from_poly(num));
            let den = collapsed_den.unwrap_or_else(|| Expr::from_poly(den));
            return num.div(&den);
        }
        if let Some(conjugate) = den.radical_conjugate() {
            return Expr::new(num.mul(&conjugate)?, den.mul(&conjugate)?);
        }

        if let Some(c) = den.as_constant() {
            return Ok(Expr::from_poly(num.scale(&c.recip())));
        }
        if let Some(quotient) = num.div_exact(&den) {
            return Ok(Expr::from_poly(quotient));
        }

        let content = num.monomial_content().gcd(&den.monomial_content());
        let (num, den) = if content.is_one() {
            (num, den)
        } else {
            (num.divide_monomial(&content), den.divide_monomial(&content))
        };
        let lead = den
            .leading()
            .map(|(_, c)| c.recip())
            .ok_or(AlgebraError::DivisionByZero)?;
        Ok(Expr {
            num: num.scale(&lead),
            den: den.scale(&lead),
        })
    }

    pub fn from_poly(num: Poly) -> Expr {
        Expr {
            num,
            den: Poly::one(),
        }
    }

    pub fn zero() -> Expr {
        Expr::from_poly(Poly::zero())
    }

    pub fn one() -> Expr {
        Expr::from_poly(Poly::one())
    }

    pub fn constant(value: BigRational) -> Expr {
        Expr::from_poly(Poly::constant(value))
    }

    pub fn integer(value: i64) -> Expr {
        Expr::constant(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn var(name: &str) -> Expr {
        Expr::from_poly(Poly::symbol(Symbol::Var(name.to_string())))
    }

    pub fn pi() -> Expr {
        Expr::from_poly(Poly::symbol(Symbol::Pi))
    }

    fn symbol(symbol: Symbol) -> Expr {
        Expr::from_poly(Poly::symbol(symbol))
    }

    /// Exact value of a decimal literal such as `12`, `0.25` or `.5`.
    pub fn decimal(literal: &str) -> Option<Expr> {
        let (whole, fraction) = literal.split_once('.').unwrap_or((literal, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        let digits = format!("{whole}{fraction}");
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let numerator: BigInt = digits.parse().ok()?;
        let scale = u32::try_from(fraction.len()).ok()?;
        let denominator = Pow::pow(&BigInt::from(10), scale);
        Some(Expr::constant(BigRational::new(numerator, denominator)))
    }

    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    pub fn as_constant(&self) -> Option<BigRational> {
        match self.den.as_constant() {
            Some(den) => self.num.as_constant().map(|num| num / den),
            None => None,
        }
    }

    /// Numeric value, when the expression has no free variables.
    pub fn approx(&self) -> Option<f64> {
        let value = self.num.approx()? / self.den.approx()?;
        value.is_finite().then_some(value)
    }

    pub fn mentions(&self, var: &str) -> bool {
        self.num.mentions(var) || self.den.mentions(var)
    }

    pub fn add(&self, other: &Expr) -> Result<Expr, AlgebraError> {
        if self.den == other.den {
            return Expr::new(self.num.add(&other.num), self.den.clone());
        }
        Expr::new(
            self.num.mul(&other.den)?.add(&other.num.mul(&self.den)?),
            self.den.mul(&other.den)?,
        )
    }

    pub fn neg(&self) -> Expr {
        Expr {
            num: self.num.neg(),
            den: self.den.clone(),
        }
    }

    pub fn sub(&self, other: &Expr) -> Result<Expr, AlgebraError> {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Expr) -> Result<Expr, AlgebraError> {
        Expr::new(self.num.mul(&other.num)?, self.den.mul(&other.den)?)
    }

    pub fn div(&self, other: &Expr) -> Result<Expr, AlgebraError> {
        if other.is_zero() {
            return Err(AlgebraError::DivisionByZero);
        }
        Expr::new(self.num.mul(&other.den)?, self.den.mul(&other.num)?)
    }

    pub fn recip(&self) -> Result<Expr, AlgebraError> {
        Expr::one().div(self)
    }

    pub fn pow_int(&self, exponent: i64) -> Result<Expr, AlgebraError> {
        let magnitude = u32::try_from(exponent.unsigned_abs())
            .ok()
            .filter(|m| *m <= MAX_EXPONENT)
            .ok_or_else(|| AlgebraError::Unsupported(format!("exponent {exponent}")))?;
        let raised = Expr::new(self.num.pow(magnitude)?, self.den.pow(magnitude)?)?;
        if exponent < 0 {
            raised.recip()
        } else {
            Ok(raised)
        }
    }

    /// `base ^ exponent`. Constant rational exponents are applied exactly
    /// where the root is exact and become radicals otherwise.
    pub fn power(&self, exponent: &Expr) -> Result<Expr, AlgebraError> {
        let Some(q) = exponent.as_constant() else {
            if self.as_constant().is_some_and(|c| c.is_one()) {
                return Ok(Expr::one());
            }
            return Ok(Expr::symbol(Symbol::Power(
                Box::new(self.clone()),
                Box::new(exponent.clone()),
            )));
        };

        if q.is_integer() {
            let exponent = q
                .to_integer()
                .to_i64()
                .ok_or_else(|| AlgebraError::Unsupported(format!("exponent {q}")))?;
            return self.pow_int(exponent);
        }

        let p = q
            .numer()
            .to_i64()
            .ok_or_else(|| AlgebraError::Unsupported(format!("exponent {q}")))?;
        let n = q
            .denom()
            .to_u32()
            .filter(|n| *n <= MAX_EXPONENT)
            .ok_or_else(|| AlgebraError::Unsupported(format!("exponent {q}")))?;
        if p < 0 {
            return self.power(&Expr::constant(-q))?.recip();
        }
        self.nth_root(n)?.pow_int(p)
    }

    pub fn nth_root(&self, n: u32) -> Result<Expr, AlgebraError> {
        if n == 1 {
            return Ok(self.clone());
        }
        if let Some(c) = self.as_constant() {
            if c.is_zero() || c.is_one() {
                return Ok(self.clone());
            }
            if c.is_negative() {
                if n % 2 == 0 {
                    return Err(AlgebraError::NotReal(format!("root({c}, {n})")));
                }
                return Ok(Expr::constant(-c).nth_root(n)?.neg());
            }
            return constant_root(&c, n);
        }
        poly_root(&self.num, n)?.div(&poly_root(&self.den, n)?)
    }

    /// Applies `func`. Exact special values are folded; everything else stays
    /// symbolic. `log` is rewritten through `ln` so both spellings agree.
    pub fn call(func: Func, args: Vec<Expr>) -> Result<Expr, AlgebraError> {
        match (func, args.as_slice()) {
            (Func::Sqrt, [x]) => x.nth_root(2),
            (Func::Root, [x, n]) => {
                let n = n
                    .as_constant()
                    .filter(|n| n.is_integer() && n.is_positive())
                    .and_then(|n| n.to_integer().to_u32())
                    .filter(|n| *n <= MAX_EXPONENT)
                    .ok_or_else(|| AlgebraError::Unsupported("root index".to_string()))?;
                x.nth_root(n)
            }
            (Func::Abs, [x]) => match x.as_constant() {
                Some(c) => Ok(Expr::constant(c.abs())),
                None => Ok(Expr::symbol(Symbol::Call(Func::Abs, args))),
            },
            (Func::Log, [x]) => Expr::call(Func::Ln, vec![x.clone()])?
                .div(&Expr::call(Func::Ln, vec![Expr::integer(10)])?),
            (Func::Log, [x, base]) => {
                let denominator = Expr::call(Func::Ln, vec![base.clone()])?;
                if denominator.is_zero() {
                    return Err(AlgebraError::NotReal("log base 1".to_string()));
                }
                Expr::call(Func::Ln, vec![x.clone()])?.div(&denominator)
            }
            (Func::Ln, [x]) => match x.as_constant() {
                Some(c) if c.is_one() => Ok(Expr::zero()),
                Some(c) if !c.is_positive() => Err(AlgebraError::NotReal(format!("ln({c})"))),
                _ => Ok(Expr::symbol(Symbol::Call(Func::Ln, args))),
            },
            (_, [x]) if x.is_zero() => match func {
                Func::Sin | Func::Tan | Func::Arcsin | Func::Arctan | Func::Sinh | Func::Tanh => {
                    Ok(Expr::zero())
                }
                Func::Cos | Func::Sec | Func::Cosh | Func::Exp => Ok(Expr::one()),
                _ => Ok(Expr::symbol(Symbol::Call(func, args))),
            },
            (_, [_]) => Ok(Expr::symbol(Symbol::Call(func, args))),
            _ => Err(AlgebraError::Unsupported(format!(
                "{func} with {} arguments",
                args.len()
            ))),
        }
    }

    pub fn substitute(&self, var: &str, value: &Expr) -> Result<Expr, AlgebraError> {
        self.num
            .substitute(var, value)?
            .div(&self.den.substitute(var, value)?)
    }

    /// Antiderivative in `var` (without a constant of integration). The
    /// denominator must be free of `var`.
    pub fn integrate(&self, var: &str) -> Result<Expr, AlgebraError> {
        if self.den.mentions(var) {
            return Err(AlgebraError::Unsupported(format!(
                "integrand is not polynomial in `{var}`"
            )));
        }
        Expr::new(self.num.integrate(var)?, self.den.clone())
    }

    /// True when `self - other` simplifies to zero.
    pub fn equivalent(&self, other: &Expr) -> bool {
        self.sub(other).is_ok_and(|difference| difference.is_zero())
    }

    /// `self / other` when it is a constant; used to compare relations.
    pub fn ratio_to(&self, other: &Expr) -> Option<BigRational> {
        self.div(other).ok()?.as_constant()
    }
}

fn rational_pow(value: &BigRational, k: u32) -> BigRational {
    BigRational::new(Pow::pow(value.numer(), k), Pow::pow(value.denom(), k))
}

fn exact_int_root(value: &BigInt, n: u32) -> Option<BigInt> {
    let root = Roots::nth_root(value, n);
    (Pow::pow(&root, n) == *value).then_some(root)
}

/// Exact rational `n`-th root of a positive rational, if there is one.
fn exact_root(value: &BigRational, n: u32) -> Option<BigRational> {
    let numer = exact_int_root(value.numer(), n)?;
    let denom = exact_int_root(value.denom(), n)?;
    Some(BigRational::new(numer, denom))
}

/// Splits `value` into `outside^n * inside`.
fn split_powers(value: &BigInt, n: u32) -> (BigInt, BigInt) {
    let mut outside = BigInt::one();
    let mut inside = value.clone();
    let mut p = 2u32;
    while p <= TRIAL_DIVISION_LIMIT {
        let power = Pow::pow(&BigInt::from(p), n);
        if power > inside {
            break;
        }
        while (&inside % &power).is_zero() {
            inside /= &power;
            outside *= p;
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if let Some(root) = exact_int_root(&inside, n) {
        outside *= root;
        inside = BigInt::one();
    }
    (outside, inside)
}

/// Canonical `n`-th root of a positive rational: `k * root(r, m)` where `r`
/// is an integer, `m` divides `n` and is as small as possible.
fn constant_root(value: &BigRational, n: u32) -> Result<Expr, AlgebraError> {
    if let Some(root) = exact_root(value, n) {
        return Ok(Expr::constant(root));
    }
    // root(p/q, n) = root(p * q^(n-1), n) / q
    let radicand = value.numer() * Pow::pow(value.denom(), n - 1);
    let (outside, mut inside) = split_powers(&radicand, n);
    let coefficient = Expr::constant(BigRational::new(outside, value.denom().clone()));
    if inside.is_one() {
        return Ok(coefficient);
    }
    let mut index = n;
    for m in (2..n).filter(|m| n % m == 0) {
        if let Some(root) = exact_int_root(&inside, n / m) {
            inside = root;
            index = m;
            break;
        }
    }
    let radical = Expr::symbol(Symbol::Root(
        Box::new(Expr::constant(BigRational::from_integer(inside))),
        index,
    ));
    coefficient.mul(&radical)
}

/// `n`-th root of a polynomial. Its rational content and monomial content
/// come out of the root; what remains stays under one radical.
fn poly_root(poly: &Poly, n: u32) -> Result<Expr, AlgebraError> {
    if let Some(c) = poly.as_constant() {
        return Expr::constant(c).nth_root(n);
    }
    let content = poly.content();
    let monomial = poly.monomial_content();
    let rest = poly.scale(&content.recip()).divide_monomial(&monomial);
    let negative = rest.leading().is_some_and(|(_, c)| c.is_negative());

    let rest_root = match rest.as_constant() {
        Some(c) if c.is_negative() && n % 2 == 0 => {
            return Ok(Expr::symbol(Symbol::Root(
                Box::new(Expr::from_poly(poly.clone())),
                n,
            )));
        }
        Some(c) => Expr::constant(c).nth_root(n)?,
        None if negative && n % 2 == 1 => {
            Expr::symbol(Symbol::Root(Box::new(Expr::from_poly(rest.neg())), n)).neg()
        }
        None => Expr::symbol(Symbol::Root(Box::new(Expr::from_poly(rest)), n)),
    };

    let mut root = constant_root(&content, n)?;
    for (symbol, e) in &monomial.0 {
        root = root.mul(&symbol_root(symbol, *e, n)?)?;
    }
    root.mul(&rest_root)
}

/// `root(symbol^e, n)` as a power of `symbol` times a power of its root.
fn symbol_root(symbol: &Symbol, e: u32, n: u32) -> Result<Expr, AlgebraError> {
    let whole = Expr::symbol(symbol.clone()).pow_int(i64::from(e / n))?;
    let rest = e % n;
    if rest == 0 {
        return Ok(whole);
    }
    let g = rest.gcd(&n);
    let index = n / g;
    let radical = match symbol {
        Symbol::Root(base, m) => {
            let nested = m
                .checked_mul(index)
                .filter(|k| *k <= MAX_EXPONENT)
                .ok_or_else(|| AlgebraError::Unsupported("root index".to_string()))?;
            base.nth_root(nested)?
        }
        _ => Expr::symbol(Symbol::Root(Box::new(Expr::symbol(symbol.clone())), index)),
    };
    whole.mul(&radical.pow_int(i64::from(rest / g))?)
}

/// Determinant by cofactor expansion along the first row.
pub fn determinant(rows: &[Vec<Expr>]) -> Result<Expr, AlgebraError> {
    let n = rows.len();
    if rows.iter().any(|row| row.len() != n) {
        return Err(AlgebraError::Unsupported(
            "determinant of a non-square matrix".to_string(),
        ));
    }
    match n {
        0 => Ok(Expr::one()),
        1 => Ok(rows[0][0].clone()),
        2 => rows[0][0]
            .mul(&rows[1][1])?
            .sub(&rows[0][1].mul(&rows[1][0])?),
        n if n > 8 => Err(AlgebraError::Unsupported(format!(
            "determinant of a {n}x{n} matrix"
        ))),
        _ => {
            let mut total = Expr::zero();
            for (col, entry) in rows[0].iter().enumerate() {
                if entry.is_zero() {
                    continue;
                }
                let minor: Vec<Vec<Expr>> = rows[1..]
                    .iter()
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .filter(|(c, _)| *c != col)
                            .map(|(_, e)| e.clone())
                            .collect()
                    })
                    .collect();
                let term = entry.mul(&determinant(&minor)?)?;
                total = if col % 2 == 0 {
                    total.add(&term)?
                } else {
                    total.sub(&term)?
                };
            }
            Ok(total)
        }
    }
}

fn fmt_rational(f: &mut fmt::Formatter<'_>, value: &BigRational) -> fmt::Result {
    if value.is_integer() {
        write!(f, "{}", value.numer())
    } else {
        write!(f, "{}/{}", value.numer(), value.denom())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Var(name) => f.write_str(name),
            Symbol::Pi => f.write_str("pi"),
            Symbol::Root(base, 2) => write!(f, "sqrt({base})"),
            Symbol::Root(base, n) => write!(f, "root({base}, {n})"),
            Symbol::Power(base, exponent) => write!(f, "({base})^({exponent})"),
            Symbol::Call(func, args) => {
                write!(f, "{func}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (symbol, exponent)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("*")?;
            }
            match exponent {
                1 => write!(f, "{symbol}")?,
                k => write!(f, "{symbol}^{k}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("0");
        }
        let mut terms: Vec<_> = self.terms.iter().collect();
        terms.sort_by(|(a, _), (b, _)| b.lex_cmp(a));
        for (i, (monomial, coefficient)) in terms.into_iter().enumerate() {
            let magnitude = coefficient.abs();
            match (i, coefficient.is_negative()) {
                (0, true) => f.write_str("-")?,
                (0, false) => {}
                (_, true) => f.write_str(" - ")?,
                (_, false) => f.write_str(" + ")?,
            }
            if monomial.is_one() {
                fmt_rational(f, &magnitude)?;
            } else if magnitude.is_one() {
                write!(f, "{monomial}")?;
            } else {
                fmt_rational(f, &magnitude)?;
                write!(f, "*{monomial}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den.as_constant().is_some_and(|c| c.is_one()) {
            return write!(f, "{}", self.num);
        }
        let grouped = |poly: &Poly| poly.terms.len() > 1;
        match (grouped(&self.num), grouped(&self.den)) {
            (true, true) => write!(f, "({})/({})", self.num, self.den),
            (true, false) => write!(f, "({})/{}", self.num, self.den),
            (false, true) => write!(f, "{}/({})", self.num, self.den),
            (false, false) => write!(f, "{}/{}", self.num, self.den),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    fn n(value: i64) -> Expr {
        Expr::integer(value)
    }

    #[test]
    fn addition_is_commutative() {
        let a = x().add(&n(1)).unwrap();
        let b = n(1).add(&x()).unwrap();
        assert!(a.equivalent(&b));
        assert_eq!(a.to_string(), "x + 1");
    }

    #[test]
    fn difference_of_squares_divides_exactly() {
        let num = x().pow_int(2).unwrap().sub(&n(1)).unwrap();
        let den = x().sub(&n(1)).unwrap();
        let quotient = num.div(&den).unwrap();
        assert_eq!(quotient.to_string(), "x + 1");
    }

    #[test]
    fn rational_functions_compare_by_cross_multiplication() {
        let a = x().div(&x().add(&n(1)).unwrap()).unwrap();
        let two_x = n(2).mul(&x()).unwrap();
        let b = two_x.div(&two_x.add(&n(2)).unwrap()).unwrap();
        assert!(a.equivalent(&b));
        assert!(!a.equivalent(&x()));
    }

    #[test]
    fn exact_roots_fold() {
        let eight = n(8);
        assert_eq!(eight.nth_root(3).unwrap().to_string(), "2");
        assert_eq!(n(-8).nth_root(3).unwrap().to_string(), "-2");
        assert!(n(-4).nth_root(2).is_err());
        let quarter = Expr::constant(BigRational::new(BigInt::from(1), BigInt::from(4)));
        assert_eq!(quarter.nth_root(2).unwrap().to_string(), "1/2");
    }

    #[test]
    fn radicals_collapse() {
        let root = n(2).nth_root(2).unwrap();
        assert_eq!(root.to_string(), "sqrt(2)");
        assert_eq!(root.pow_int(2).unwrap().to_string(), "2");
        let sqrt_x = x().nth_root(2).unwrap();
        assert!(sqrt_x.mul(&sqrt_x).unwrap().equivalent(&x()));
    }

    fn sqrt(value: &Expr) -> Expr {
        value.nth_root(2).unwrap()
    }

    #[test]
    fn constant_radicals_are_canonical() {
        assert_eq!(sqrt(&n(8)).to_string(), "2*sqrt(2)");
        assert_eq!(n(4).nth_root(4).unwrap(), sqrt(&n(2)));
        let cube_roots = n(2).nth_root(3).unwrap().mul(&n(4).nth_root(3).unwrap()).unwrap();
        assert_eq!(cube_roots, n(2));
        let half = Expr::constant(BigRational::new(BigInt::from(1), BigInt::from(2)));
        assert_eq!(sqrt(&half), sqrt(&n(2)).div(&n(2)).unwrap());
    }

    #[test]
    fn radicals_with_free_variables() {
        let a = x().mul(&sqrt(&n(8))).unwrap();
        let b = n(2).mul(&sqrt(&n(2))).unwrap().mul(&x()).unwrap();
        assert!(a.equivalent(&b));

        let a = x().div(&sqrt(&n(2))).unwrap();
        let b = sqrt(&n(2)).mul(&x()).unwrap().div(&n(2)).unwrap();
        assert!(a.equivalent(&b));
        assert_eq!(a, b);

        let a = x().mul(&sqrt(&n(2))).unwrap().mul(&sqrt(&n(3))).unwrap();
        assert_eq!(a, x().mul(&sqrt(&n(6))).unwrap());

        let four_x = n(4).mul(&x()).unwrap();
        assert_eq!(sqrt(&four_x), n(2).mul(&sqrt(&x())).unwrap());
        assert!(!sqrt(&four_x).equivalent(&sqrt(&x())));

        let x_cubed = x().pow_int(3).unwrap();
        assert_eq!(sqrt(&x_cubed), x().mul(&sqrt(&x())).unwrap());
    }

    #[test]
    fn expansion_is_bounded() {
        let sum = ["a", "b", "c", "d"]
            .iter()
            .try_fold(Expr::zero(), |acc, name| acc.add(&Expr::var(name)))
            .unwrap();
        assert!(sum.pow_int(3).is_ok());
        assert!(matches!(
            sum.pow_int(4096),
            Err(AlgebraError::Unsupported(reason)) if reason.contains("terms")
        ));
    }

    #[test]
    fn rational_exponents() {
        let half = Expr::constant(BigRational::new(BigInt::from(1), BigInt::from(2)));
        assert_eq!(n(9).power(&half).unwrap().to_string(), "3");
        let three_halves = Expr::constant(BigRational::new(BigInt::from(3), BigInt::from(2)));
        assert!(x().power(&three_halves).unwrap().equivalent(
            &x().mul(&x().nth_root(2).unwrap()).unwrap()
        ));
    }

    #[test]
    fn decimals_are_exact() {
        let a = Expr::decimal("0.1").unwrap().add(&Expr::decimal("0.2").unwrap()).unwrap();
        assert!(a.equivalent(&Expr::decimal("0.3").unwrap()));
        assert_eq!(Expr::decimal(".5").unwrap().to_string(), "1/2");
        assert!(Expr::decimal(".").is_none());
    }

    #[test]
    fn logarithms_share_a_canonical_form() {
        let log = Expr::call(Func::Log, vec![x()]).unwrap();
        let via_ln = Expr::call(Func::Ln, vec![x()])
            .unwrap()
            .div(&Expr::call(Func::Ln, vec![n(10)]).unwrap())
            .unwrap();
        assert!(log.equivalent(&via_ln));
        let log2_8 = Expr::call(Func::Log, vec![n(8), n(2)]).unwrap();
        assert!((log2_8.approx().unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn substitution_and_integration() {
        let poly = x().pow_int(2).unwrap();
        let antiderivative = poly.integrate("x").unwrap();
        let area = antiderivative
            .substitute("x", &n(3))
            .unwrap()
            .sub(&antiderivative.substitute("x", &n(0)).unwrap())
            .unwrap();
        assert_eq!(area.to_string(), "9");
    }

    #[test]
    fn integrating_through_a_function_is_unsupported() {
        let sin = Expr::call(Func::Sin, vec![x()]).unwrap();
        assert!(sin.integrate("x").is_err());
    }

    #[test]
    fn determinant_of_three_by_three() {
        let rows = vec![
            vec![n(2), n(0), n(1)],
            vec![n(1), n(3), n(2)],
            vec![n(1), n(1), n(2)],
        ];
        assert_eq!(determinant(&rows).unwrap().to_string(), "6");
    }

    #[test]
    fn approximations() {
        assert_eq!(x().approx(), None);
        let value = Expr::pi().mul(&n(2)).unwrap().approx().unwrap();
        assert!((value - std::f64::consts::TAU).abs() < 1e-12);
        let root = n(2).nth_root(2).unwrap().approx().unwrap();
        assert!((root - 2f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(x().div(&n(0)), Err(AlgebraError::DivisionByZero));
        assert_eq!(n(0).pow_int(-1), Err(AlgebraError::DivisionByZero));
    }
}
