//! Encodings: decision-diagram representations of typed symbols.
//!
//! The encoding manager owns the ADD manager and is the only place bit
//! variables are allocated. Each bit records the time step it was created
//! for, so the SAT layer can translate a diagram variable asserted at base
//! time `t` into the solver variable for absolute time `t + offset`.
//!
//! Digit order is little-endian throughout: digit `k` of an algebraic
//! encoding holds value bits `[4k, 4k+4)` and `dds()[k]` is the k-th least
//! significant nibble. The flattened `bits()` list is digit-major in the
//! same order with the least significant bit of each digit first.

use std::collections::HashMap;

use argus_add::{Add, AddManager, AddOp};
use argus_expr::{
    Atom, ExprId, ModelError, ScalarValue, Step, Type, TypeId, TypeStore, Value, NIBBLE_SIZE,
};
use log::trace;

/// Reference to an encoding owned by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodingId(u32);

/// Shape of an encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingKind {
    /// One bit
    Boolean,
    /// One packed monolithic diagram indexing the literal set
    Enum {
        /// Literals in canonical (sorted) order
        literals: Vec<Atom>,
    },
    /// One diagram per nibble digit
    Algebraic {
        /// Width in nibbles
        width: u16,
        /// Two's-complement interpretation on map-back
        signed: bool,
    },
    /// Concatenated element encodings
    Array {
        /// Digits per element
        elem_width: u16,
        /// Number of elements
        size: u16,
        /// Element signedness
        signed: bool,
    },
}

/// An encoding: the diagram vector for one symbol at one time step
#[derive(Debug, Clone)]
pub struct Encoding {
    kind: EncodingKind,
    dds: Vec<Add>,
    bits: Vec<Add>,
}

impl Encoding {
    /// Shape of this encoding
    pub fn kind(&self) -> &EncodingKind {
        &self.kind
    }

    /// The diagram vector (one entry per semantic digit)
    pub fn dds(&self) -> &[Add] {
        &self.dds
    }

    /// All underlying bit-variable diagrams, digit-major little-endian,
    /// least significant bit of each digit first
    pub fn bits(&self) -> &[Add] {
        &self.bits
    }

    /// Evaluate the encoding under a total bit assignment, recovering the
    /// scalar value. Fails cleanly on unassigned bits and on arrays.
    pub fn value(
        &self,
        mgr: &AddManager,
        assignment: &HashMap<u32, bool>,
    ) -> Result<ScalarValue, ModelError> {
        let eval = |dd: Add| {
            mgr.eval(dd, assignment).ok_or_else(|| ModelError::Eval {
                detail: "assignment leaves encoding bits undetermined".to_string(),
            })
        };

        match &self.kind {
            EncodingKind::Boolean => Ok(ScalarValue::Bool(eval(self.dds[0])? != 0)),
            EncodingKind::Enum { literals } => {
                let index = eval(self.dds[0])?;
                let lit = literals.get(index as usize).ok_or_else(|| ModelError::Eval {
                    detail: format!("enum index {index} outside the literal set"),
                })?;
                Ok(ScalarValue::Literal(*lit))
            }
            EncodingKind::Algebraic { width, signed } => {
                let mut raw: Value = 0;
                for (k, dd) in self.dds.iter().enumerate() {
                    raw += eval(*dd)? << (k as u32 * NIBBLE_SIZE as u32);
                }
                Ok(ScalarValue::Int(signed_adjust(raw, *width, *signed)))
            }
            EncodingKind::Array { .. } => Err(ModelError::Eval {
                detail: "an array encoding cannot be evaluated".to_string(),
            }),
        }
    }
}

/// Reinterpret a raw unsigned digit aggregate in two's complement
pub fn signed_adjust(raw: Value, width: u16, signed: bool) -> Value {
    let bits = width as u32 * NIBBLE_SIZE as u32;
    if !signed || bits >= 64 {
        // 64-bit encodings already carry their sign in the native word
        return raw;
    }
    let span = 1i64 << bits;
    if raw >= span / 2 {
        raw - span
    } else {
        raw
    }
}

/// The encoding manager: bit allocation, encoding construction and the
/// per-(context, identifier, time) cache.
#[derive(Debug)]
pub struct EncodingMgr {
    add: AddManager,
    bit_times: Vec<Step>,
    cache: HashMap<(ExprId, Atom, Step), EncodingId>,
    store: Vec<Encoding>,
    temporaries: Vec<String>,
}

impl Default for EncodingMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodingMgr {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            add: AddManager::new(),
            bit_times: Vec::new(),
            cache: HashMap::new(),
            store: Vec::new(),
            temporaries: Vec::new(),
        }
    }

    /// The underlying diagram manager
    pub fn add(&self) -> &AddManager {
        &self.add
    }

    /// Mutable access to the diagram manager
    pub fn add_mut(&mut self) -> &mut AddManager {
        &mut self.add
    }

    /// Time offset a bit variable was allocated for
    pub fn bit_time(&self, var: u32) -> Step {
        self.bit_times[var as usize]
    }

    /// Fetch an encoding
    pub fn get(&self, id: EncodingId) -> &Encoding {
        &self.store[id.0 as usize]
    }

    /// Allocate one bit variable recording its time offset
    pub fn make_bit(&mut self, time: Step) -> Add {
        let bit = self.add.bit();
        self.bit_times.push(time);
        debug_assert_eq!(self.bit_times.len() as u32, self.add.var_count());
        bit
    }

    /// Build a packed monolithic diagram over `nbits` fresh bits.
    /// Returns the packed diagram and the bits least-significant first.
    fn make_monolithic(&mut self, nbits: u32, time: Step) -> (Add, Vec<Add>) {
        assert!(0 < nbits);
        let mut created = Vec::new();
        let mut packed = self.make_bit(time);
        created.push(packed);

        let two = self.add.constant(2);
        for _ in 1..nbits {
            let next = self.make_bit(time);
            let scaled = self.add.apply(AddOp::Times, packed, two);
            packed = self.add.apply(AddOp::Plus, scaled, next);
            created.push(next);
        }

        // creation order is most significant first
        created.reverse();
        (packed, created)
    }

    fn make_algebraic_digits(&mut self, width: u16, time: Step) -> (Vec<Add>, Vec<Add>) {
        let mut dds = Vec::with_capacity(width as usize);
        let mut bits = Vec::with_capacity(width as usize * NIBBLE_SIZE as usize);
        for _ in 0..width {
            let (digit, digit_bits) = self.make_monolithic(NIBBLE_SIZE as u32, time);
            dds.push(digit);
            bits.extend(digit_bits);
        }
        (dds, bits)
    }

    /// Encoding for `(ctx, name)` of type `ty` at time `time`; produced at
    /// most once and cached for the manager's lifetime.
    pub fn encoding_for(
        &mut self,
        types: &TypeStore,
        ctx: ExprId,
        name: Atom,
        ty: TypeId,
        time: Step,
    ) -> Result<EncodingId, ModelError> {
        if let Some(id) = self.cache.get(&(ctx, name, time)) {
            return Ok(*id);
        }
        let enc = self.make_encoding(types, ty, time)?;
        let id = self.push(enc);
        trace!("created encoding {id:?} for symbol at time {time}");
        self.cache.insert((ctx, name, time), id);
        Ok(id)
    }

    /// Build an encoding for a type without caching
    pub fn make_encoding(
        &mut self,
        types: &TypeStore,
        ty: TypeId,
        time: Step,
    ) -> Result<Encoding, ModelError> {
        match types.get(ty).clone() {
            Type::Boolean => {
                let bit = self.make_bit(time);
                Ok(Encoding {
                    kind: EncodingKind::Boolean,
                    dds: vec![bit],
                    bits: vec![bit],
                })
            }
            Type::Enum { literals } => {
                let n = literals.len() as Value;
                let nbits = range_repr_bits(n);
                let (raw, bits) = self.make_monolithic(nbits, time);
                // clamp out-of-range indices onto the last literal so any
                // solver assignment maps back into the literal set
                let bound = self.add.constant(n);
                let last = self.add.constant(n - 1);
                let in_range = self.add.apply(AddOp::Lt, raw, bound);
                let packed = self.add.ite(in_range, raw, last);
                Ok(Encoding {
                    kind: EncodingKind::Enum { literals },
                    dds: vec![packed],
                    bits,
                })
            }
            Type::UnsignedInt { width } | Type::SignedInt { width } => {
                let signed = types.is_signed(ty);
                let (dds, bits) = self.make_algebraic_digits(width, time);
                Ok(Encoding {
                    kind: EncodingKind::Algebraic { width, signed },
                    dds,
                    bits,
                })
            }
            Type::UnsignedFxd { width, fract } | Type::SignedFxd { width, fract } => {
                let signed = types.is_signed(ty);
                let total = width + fract;
                let (dds, bits) = self.make_algebraic_digits(total, time);
                Ok(Encoding {
                    kind: EncodingKind::Algebraic {
                        width: total,
                        signed,
                    },
                    dds,
                    bits,
                })
            }
            Type::Array { element, size } => {
                if !types.is_algebraic(element) {
                    return Err(ModelError::Capability {
                        detail: "arrays of non-algebraic elements".to_string(),
                    });
                }
                let elem_width = types.width(element);
                let signed = types.is_signed(element);
                let mut dds = Vec::new();
                let mut bits = Vec::new();
                for _ in 0..size {
                    let (d, b) = self.make_algebraic_digits(elem_width, time);
                    dds.extend(d);
                    bits.extend(b);
                }
                Ok(Encoding {
                    kind: EncodingKind::Array {
                        elem_width,
                        size,
                        signed,
                    },
                    dds,
                    bits,
                })
            }
            Type::IntConst | Type::FxdConst | Type::Instance { .. } => Err(ModelError::Capability {
                detail: "no encoding exists for this type".to_string(),
            }),
        }
    }

    /// Fresh temporary algebraic encoding (`__tmp<n>`), `width` digits
    pub fn fresh_algebraic(&mut self, width: u16, time: Step) -> EncodingId {
        let name = format!("__tmp{}", self.temporaries.len());
        self.temporaries.push(name);
        let (dds, bits) = self.make_algebraic_digits(width, time);
        self.push(Encoding {
            kind: EncodingKind::Algebraic {
                width,
                signed: false,
            },
            dds,
            bits,
        })
    }

    /// Names of the temporaries synthesised so far
    pub fn temporaries(&self) -> &[String] {
        &self.temporaries
    }

    fn push(&mut self, enc: Encoding) -> EncodingId {
        let id = EncodingId(self.store.len() as u32);
        self.store.push(enc);
        id
    }
}

/// Smallest number of bits indexing a set of `n` values
fn range_repr_bits(n: Value) -> u32 {
    assert!(0 < n);
    let mut bits = 0;
    while (1 << bits) < n {
        bits += 1;
    }
    bits.max(1)
}
