use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;

use lazy_static::lazy_static;

use crate::bitreader::{self, BitReader};
use crate::flattenedserializers::{Dt, DtField};

// NOTE: credit for figuring out the field path encoding goes to invokr
// (github.com/dotabuff/manta) and spheenik (github.com/skadistats/clarity).

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // crate
    #[error(transparent)]
    BitReader(#[from] bitreader::Error),
    // mod
    #[error("component {component} is out of range for table {table}")]
    ComponentOutOfRange { table: String, component: i32 },
    #[error("component {component} of table {table} does not address a sub-table")]
    NotATable { table: String, component: i32 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A cursor into a serializer tree: up to seven component indices, the first
/// seeded to -1 so that the initial increment op lands on element zero.
#[derive(Debug, Clone)]
pub struct FieldPath {
    data: [i32; 7],
    last: usize,
    finished: bool,
}

impl Default for FieldPath {
    #[inline]
    fn default() -> Self {
        Self {
            data: [-1, 0, 0, 0, 0, 0, 0],
            last: 0,
            finished: false,
        }
    }
}

impl FieldPath {
    #[inline(always)]
    fn inc_at(&mut self, i: usize, v: i32) {
        self.data[i] += v;
    }

    #[inline(always)]
    fn inc_last(&mut self, v: i32) {
        self.inc_at(self.last, v);
    }

    #[inline(always)]
    fn push(&mut self, v: i32) {
        self.last += 1;
        self.data[self.last] = v;
    }

    #[inline(always)]
    fn pop(&mut self, n: usize) {
        for _ in 0..n {
            self.data[self.last] = 0;
            self.last -= 1;
        }
    }

    #[inline]
    pub fn last(&self) -> usize {
        self.last
    }

    #[inline]
    pub fn components(&self) -> &[i32] {
        &self.data[..=self.last]
    }
}

type FieldOp = fn(&mut FieldPath, &mut BitReader) -> Result<()>;

fn plus_one(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.inc_last(1);
    Ok(())
}

fn plus_two(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.inc_last(2);
    Ok(())
}

fn plus_three(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.inc_last(3);
    Ok(())
}

fn plus_four(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.inc_last(4);
    Ok(())
}

fn plus_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(br.read_ubitvarfp()? as i32 + 5);
    Ok(())
}

fn push_one_left_delta_zero_right_zero(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.push(0);
    Ok(())
}

fn push_one_left_delta_zero_right_non_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_one_left_delta_one_right_zero(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.inc_last(1);
    fp.push(0);
    Ok(())
}

fn push_one_left_delta_one_right_non_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(1);
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_one_left_delta_n_right_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(br.read_ubitvarfp()? as i32);
    fp.push(0);
    Ok(())
}

fn push_one_left_delta_n_right_non_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(br.read_ubitvarfp()? as i32 + 2);
    fp.push(br.read_ubitvarfp()? as i32 + 1);
    Ok(())
}

fn push_one_left_delta_n_right_non_zero_pack6_bits(
    fp: &mut FieldPath,
    br: &mut BitReader,
) -> Result<()> {
    fp.inc_last(br.read_ubit32(3)? as i32 + 2);
    fp.push(br.read_ubit32(3)? as i32 + 1);
    Ok(())
}

fn push_one_left_delta_n_right_non_zero_pack8_bits(
    fp: &mut FieldPath,
    br: &mut BitReader,
) -> Result<()> {
    fp.inc_last(br.read_ubit32(4)? as i32 + 2);
    fp.push(br.read_ubit32(4)? as i32 + 1);
    Ok(())
}

fn push_two_left_delta_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_two_left_delta_one(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(1);
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_two_left_delta_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(br.read_ubitvar()? as i32 + 2);
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_two_pack5_left_delta_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    Ok(())
}

fn push_two_pack5_left_delta_one(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(1);
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    Ok(())
}

fn push_two_pack5_left_delta_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(br.read_ubitvar()? as i32 + 2);
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    Ok(())
}

fn push_three_left_delta_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_three_left_delta_one(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(1);
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_three_left_delta_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(br.read_ubitvar()? as i32 + 2);
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    fp.push(br.read_ubitvarfp()? as i32);
    Ok(())
}

fn push_three_pack5_left_delta_zero(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    Ok(())
}

fn push_three_pack5_left_delta_one(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(1);
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    Ok(())
}

fn push_three_pack5_left_delta_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.inc_last(br.read_ubitvar()? as i32 + 2);
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    fp.push(br.read_ubit32(5)? as i32);
    Ok(())
}

fn push_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    let n = br.read_ubitvar()? as usize;
    fp.inc_last(br.read_ubitvar()? as i32);
    for _ in 0..n {
        fp.push(br.read_ubitvarfp()? as i32);
    }
    Ok(())
}

fn push_n_and_non_topographical(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    for i in 0..=fp.last {
        if br.read_bool()? {
            fp.inc_at(i, br.read_varint32()? + 1);
        }
    }
    let n = br.read_ubitvar()? as usize;
    for _ in 0..n {
        fp.push(br.read_ubitvarfp()? as i32);
    }
    Ok(())
}

fn pop_one_plus_one(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.pop(1);
    fp.inc_last(1);
    Ok(())
}

fn pop_one_plus_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.pop(1);
    fp.inc_last(br.read_ubitvarfp()? as i32 + 1);
    Ok(())
}

fn pop_all_but_one_plus_one(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.pop(fp.last);
    fp.inc_last(1);
    Ok(())
}

fn pop_all_but_one_plus_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.pop(fp.last);
    fp.inc_last(br.read_ubitvarfp()? as i32 + 1);
    Ok(())
}

fn pop_all_but_one_plus_n_pack3_bits(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.pop(fp.last);
    fp.inc_last(br.read_ubit32(3)? as i32 + 1);
    Ok(())
}

fn pop_all_but_one_plus_n_pack6_bits(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.pop(fp.last);
    fp.inc_last(br.read_ubit32(6)? as i32 + 1);
    Ok(())
}

fn pop_n_plus_one(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.pop(br.read_ubitvarfp()? as usize);
    fp.inc_last(1);
    Ok(())
}

fn pop_n_plus_n(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.pop(br.read_ubitvarfp()? as usize);
    let v = br.read_varint32()?;
    fp.inc_last(v);
    Ok(())
}

fn pop_n_and_non_topographical(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    fp.pop(br.read_ubitvarfp()? as usize);
    for i in 0..=fp.last {
        if br.read_bool()? {
            let v = br.read_varint32()?;
            fp.inc_at(i, v);
        }
    }
    Ok(())
}

fn non_topo_complex(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    for i in 0..=fp.last {
        if br.read_bool()? {
            let v = br.read_varint32()?;
            fp.inc_at(i, v);
        }
    }
    Ok(())
}

fn non_topo_penultimate_plus_one(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.inc_at(fp.last - 1, 1);
    Ok(())
}

fn non_topo_complex_pack4_bits(fp: &mut FieldPath, br: &mut BitReader) -> Result<()> {
    for i in 0..=fp.last {
        if br.read_bool()? {
            fp.inc_at(i, br.read_ubit32(4)? as i32 - 7);
        }
    }
    Ok(())
}

fn field_path_encode_finish(fp: &mut FieldPath, _br: &mut BitReader) -> Result<()> {
    fp.finished = true;
    Ok(())
}

struct FieldOpDescriptor {
    name: &'static str,
    weight: usize,
    op: FieldOp,
}

// the op alphabet and its weights come from the encoder; both must match it
// bit-for-bit
const FIELDOP_DESCRIPTORS: &[FieldOpDescriptor] = &[
    FieldOpDescriptor {
        name: "PlusOne",
        weight: 36271,
        op: plus_one,
    },
    FieldOpDescriptor {
        name: "PlusTwo",
        weight: 10334,
        op: plus_two,
    },
    FieldOpDescriptor {
        name: "PlusThree",
        weight: 1375,
        op: plus_three,
    },
    FieldOpDescriptor {
        name: "PlusFour",
        weight: 646,
        op: plus_four,
    },
    FieldOpDescriptor {
        name: "PlusN",
        weight: 4128,
        op: plus_n,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaZeroRightZero",
        weight: 35,
        op: push_one_left_delta_zero_right_zero,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaZeroRightNonZero",
        weight: 3,
        op: push_one_left_delta_zero_right_non_zero,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaOneRightZero",
        weight: 521,
        op: push_one_left_delta_one_right_zero,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaOneRightNonZero",
        weight: 2942,
        op: push_one_left_delta_one_right_non_zero,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaNRightZero",
        weight: 560,
        op: push_one_left_delta_n_right_zero,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaNRightNonZero",
        weight: 471,
        op: push_one_left_delta_n_right_non_zero,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaNRightNonZeroPack6Bits",
        weight: 10530,
        op: push_one_left_delta_n_right_non_zero_pack6_bits,
    },
    FieldOpDescriptor {
        name: "PushOneLeftDeltaNRightNonZeroPack8Bits",
        weight: 251,
        op: push_one_left_delta_n_right_non_zero_pack8_bits,
    },
    FieldOpDescriptor {
        name: "PushTwoLeftDeltaZero",
        weight: 1,
        op: push_two_left_delta_zero,
    },
    FieldOpDescriptor {
        name: "PushTwoPack5LeftDeltaZero",
        weight: 1,
        op: push_two_pack5_left_delta_zero,
    },
    FieldOpDescriptor {
        name: "PushThreeLeftDeltaZero",
        weight: 1,
        op: push_three_left_delta_zero,
    },
    FieldOpDescriptor {
        name: "PushThreePack5LeftDeltaZero",
        weight: 1,
        op: push_three_pack5_left_delta_zero,
    },
    FieldOpDescriptor {
        name: "PushTwoLeftDeltaOne",
        weight: 1,
        op: push_two_left_delta_one,
    },
    FieldOpDescriptor {
        name: "PushTwoPack5LeftDeltaOne",
        weight: 1,
        op: push_two_pack5_left_delta_one,
    },
    FieldOpDescriptor {
        name: "PushThreeLeftDeltaOne",
        weight: 1,
        op: push_three_left_delta_one,
    },
    FieldOpDescriptor {
        name: "PushThreePack5LeftDeltaOne",
        weight: 1,
        op: push_three_pack5_left_delta_one,
    },
    FieldOpDescriptor {
        name: "PushTwoLeftDeltaN",
        weight: 1,
        op: push_two_left_delta_n,
    },
    FieldOpDescriptor {
        name: "PushTwoPack5LeftDeltaN",
        weight: 1,
        op: push_two_pack5_left_delta_n,
    },
    FieldOpDescriptor {
        name: "PushThreeLeftDeltaN",
        weight: 1,
        op: push_three_left_delta_n,
    },
    FieldOpDescriptor {
        name: "PushThreePack5LeftDeltaN",
        weight: 1,
        op: push_three_pack5_left_delta_n,
    },
    FieldOpDescriptor {
        name: "PushN",
        weight: 1,
        op: push_n,
    },
    FieldOpDescriptor {
        name: "PushNAndNonTopographical",
        weight: 310,
        op: push_n_and_non_topographical,
    },
    FieldOpDescriptor {
        name: "PopOnePlusOne",
        weight: 2,
        op: pop_one_plus_one,
    },
    FieldOpDescriptor {
        name: "PopOnePlusN",
        weight: 1,
        op: pop_one_plus_n,
    },
    FieldOpDescriptor {
        name: "PopAllButOnePlusOne",
        weight: 1837,
        op: pop_all_but_one_plus_one,
    },
    FieldOpDescriptor {
        name: "PopAllButOnePlusN",
        weight: 149,
        op: pop_all_but_one_plus_n,
    },
    FieldOpDescriptor {
        name: "PopAllButOnePlusNPack3Bits",
        weight: 300,
        op: pop_all_but_one_plus_n_pack3_bits,
    },
    FieldOpDescriptor {
        name: "PopAllButOnePlusNPack6Bits",
        weight: 634,
        op: pop_all_but_one_plus_n_pack6_bits,
    },
    FieldOpDescriptor {
        name: "PopNPlusOne",
        weight: 1,
        op: pop_n_plus_one,
    },
    FieldOpDescriptor {
        name: "PopNPlusN",
        weight: 1,
        op: pop_n_plus_n,
    },
    FieldOpDescriptor {
        name: "PopNAndNonTopographical",
        weight: 1,
        op: pop_n_and_non_topographical,
    },
    FieldOpDescriptor {
        name: "NonTopoComplex",
        weight: 76,
        op: non_topo_complex,
    },
    FieldOpDescriptor {
        name: "NonTopoPenultimatePlusOne",
        weight: 271,
        op: non_topo_penultimate_plus_one,
    },
    FieldOpDescriptor {
        name: "NonTopoComplexPack4Bits",
        weight: 99,
        op: non_topo_complex_pack4_bits,
    },
    FieldOpDescriptor {
        name: "FieldPathEncodeFinish",
        weight: 25474,
        op: field_path_encode_finish,
    },
];

enum Node<T> {
    Leaf {
        weight: usize,
        num: usize,
        value: T,
    },
    Branch {
        weight: usize,
        num: usize,
        left: Box<Node<T>>,
        right: Box<Node<T>>,
    },
}

impl<T> Node<T> {
    fn weight(&self) -> usize {
        match self {
            Self::Leaf { weight, .. } => *weight,
            Self::Branch { weight, .. } => *weight,
        }
    }

    fn num(&self) -> usize {
        match self {
            Self::Leaf { num, .. } => *num,
            Self::Branch { num, .. } => *num,
        }
    }

    fn unwrap_left_branch(&self) -> &Self {
        match self {
            Self::Branch { ref left, .. } => left,
            _ => unreachable!(),
        }
    }

    fn unwrap_right_branch(&self) -> &Self {
        match self {
            Self::Branch { ref right, .. } => right,
            _ => unreachable!(),
        }
    }
}

// valve's huffman-tree construction takes the node sequence number into
// account when weights collide; reproducing it exactly is what keeps the
// decoder in lockstep with the encoder
impl<T> Ord for Node<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.weight() == other.weight() {
            self.num().cmp(&other.num())
        } else {
            other.weight().cmp(&self.weight())
        }
    }
}

impl<T> PartialOrd for Node<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.weight() == other.weight() && self.num() == other.num()
    }
}

impl<T> Eq for Node<T> {}

fn build_fieldop_hierarchy() -> Option<Node<&'static FieldOpDescriptor>> {
    let mut bh = BinaryHeap::with_capacity(FIELDOP_DESCRIPTORS.len() * 2);

    let mut num = 0;
    for fod in FIELDOP_DESCRIPTORS.iter() {
        bh.push(Node::Leaf {
            weight: fod.weight,
            num,
            value: fod,
        });
        num += 1;
    }

    while bh.len() > 1 {
        let left = bh.pop()?;
        let right = bh.pop()?;
        bh.push(Node::Branch {
            weight: left.weight() + right.weight(),
            num,
            left: Box::new(left),
            right: Box::new(right),
        });
        num += 1;
    }

    bh.pop()
}

lazy_static! {
    static ref FIELDOP_HIERARCHY: Node<&'static FieldOpDescriptor> = {
        match build_fieldop_hierarchy() {
            Some(root) => root,
            // the descriptor table is non-empty, the build cannot come up short
            None => unreachable!(),
        }
    };
}

/// One emitted leaf of a field-path walk: the dotted path name and the leaf
/// field descriptor it addresses.
pub(crate) struct FieldWalkItem<'a> {
    pub name: String,
    pub field: &'a DtField,
}

/// Reads huffman-coded path ops until the encoder's finish marker, resolving
/// every intermediate path against `table` in emission order.
pub(crate) fn walk_fields<'a>(
    br: &mut BitReader,
    table: &'a Dt,
) -> Result<Vec<FieldWalkItem<'a>>> {
    let mut fp = FieldPath::default();
    let mut items = Vec::new();

    let mut node: &Node<&FieldOpDescriptor> = &FIELDOP_HIERARCHY;
    while !fp.finished {
        let next = if br.read_bool()? {
            node.unwrap_right_branch()
        } else {
            node.unwrap_left_branch()
        };

        node = if let Node::Leaf { value: fod, .. } = next {
            (fod.op)(&mut fp, br)?;
            if !fp.finished {
                log::trace!("fieldpath op {} -> {:?}", fod.name, fp.components());
                items.push(resolve_field(table, &fp)?);
            }
            &FIELDOP_HIERARCHY
        } else {
            next
        };
    }

    Ok(items)
}

// Resolves the current path: every component but the last must address a
// composite property (one carrying a sub-table), the last addresses the leaf.
// The dotted name is the join of the traversed property names.
fn resolve_field<'a>(table: &'a Dt, fp: &FieldPath) -> Result<FieldWalkItem<'a>> {
    let mut current = table;
    let mut name = String::new();

    for i in 0..fp.last {
        let component = fp.data[i];
        let prop = current
            .properties
            .get(component as usize)
            .ok_or_else(|| Error::ComponentOutOfRange {
                table: current.name.to_string(),
                component,
            })?;
        name.push_str(&prop.field.name);
        name.push('.');
        current = prop
            .table
            .as_deref()
            .ok_or_else(|| Error::NotATable {
                table: current.name.to_string(),
                component,
            })?;
    }

    let component = fp.data[fp.last];
    let prop = current
        .properties
        .get(component as usize)
        .ok_or_else(|| Error::ComponentOutOfRange {
            table: current.name.to_string(),
            component,
        })?;
    name.push_str(&prop.field.name);

    Ok(FieldWalkItem {
        name,
        field: &prop.field,
    })
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::flattenedserializers::DtProperty;

    struct BitWriter {
        bytes: Vec<u8>,
        bit: usize,
    }

    impl BitWriter {
        fn new() -> Self {
            Self {
                bytes: Vec::new(),
                bit: 0,
            }
        }

        fn write_bit(&mut self, value: bool) {
            if self.bit & 7 == 0 {
                self.bytes.push(0);
            }
            if value {
                let i = self.bytes.len() - 1;
                self.bytes[i] |= 1 << (self.bit & 7);
            }
            self.bit += 1;
        }

        fn write_code(&mut self, code: &str) {
            for c in code.chars() {
                self.write_bit(c == '1');
            }
        }

        fn finish(self) -> Vec<u8> {
            self.bytes
        }
    }

    // huffman codes produced by the reference weights
    const PLUS_ONE: &str = "0";
    const PLUS_TWO: &str = "1110";
    const PUSH_ONE_LEFT_DELTA_ONE_RIGHT_ZERO: &str = "11011010";
    const FINISH: &str = "10";

    fn leaf(name: &str) -> DtProperty {
        DtProperty {
            field: DtField {
                name: name.into(),
                field_type: "uint32".into(),
                encoder: None,
                index: -1,
                flags: None,
                bit_count: None,
                low_value: None,
                high_value: None,
                version: None,
                serializer: None,
                build: 0,
            },
            table: None,
        }
    }

    fn table(name: &str, properties: Vec<DtProperty>) -> Dt {
        Dt {
            name: name.into(),
            version: 0,
            flags: None,
            properties,
        }
    }

    #[test]
    fn test_walk_flat_table() {
        let dt = table(
            "CTest",
            vec![leaf("m_iHealth"), leaf("m_iMana"), leaf("m_iLevel")],
        );

        let mut bw = BitWriter::new();
        bw.write_code(PLUS_ONE); // -> m_iHealth
        bw.write_code(PLUS_TWO); // -> m_iLevel
        bw.write_code(FINISH);
        let buf = bw.finish();

        let mut br = BitReader::new(&buf);
        let items = walk_fields(&mut br, &dt).unwrap();
        let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["m_iHealth", "m_iLevel"]);
    }

    #[test]
    fn test_walk_nested_table_emits_dotted_names() {
        let body = table("CBodyComponentPoint", vec![leaf("m_cellX"), leaf("m_cellY")]);
        let mut body_prop = leaf("CBodyComponent");
        body_prop.table = Some(Rc::new(body));
        let dt = table("CWorld", vec![body_prop]);

        let mut bw = BitWriter::new();
        bw.write_code(PUSH_ONE_LEFT_DELTA_ONE_RIGHT_ZERO); // -> [0, 0]
        bw.write_code(PLUS_ONE); // -> [0, 1]
        bw.write_code(FINISH);
        let buf = bw.finish();

        let mut br = BitReader::new(&buf);
        let items = walk_fields(&mut br, &dt).unwrap();
        let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["CBodyComponent.m_cellX", "CBodyComponent.m_cellY"]
        );
    }

    #[test]
    fn test_walk_into_leaf_is_an_error() {
        let dt = table("CTest", vec![leaf("m_iHealth")]);

        let mut bw = BitWriter::new();
        bw.write_code(PUSH_ONE_LEFT_DELTA_ONE_RIGHT_ZERO);
        bw.write_code(FINISH);
        let buf = bw.finish();

        let mut br = BitReader::new(&buf);
        assert!(matches!(
            walk_fields(&mut br, &dt),
            Err(Error::NotATable { .. })
        ));
    }

    #[test]
    fn test_walk_out_of_range_component() {
        let dt = table("CTest", vec![leaf("m_iHealth")]);

        let mut bw = BitWriter::new();
        bw.write_code(PLUS_ONE);
        bw.write_code(PLUS_ONE); // index 1 does not exist
        bw.write_code(FINISH);
        let buf = bw.finish();

        let mut br = BitReader::new(&buf);
        assert!(matches!(
            walk_fields(&mut br, &dt),
            Err(Error::ComponentOutOfRange {
                component: 1,
                ..
            })
        ));
    }
}
