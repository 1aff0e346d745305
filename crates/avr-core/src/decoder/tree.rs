//! Decision-tree tables.
//!
//! Nodes live in one arena. Each branch node extracts
//! `(word0 >> left_bit) & mask` and follows a dense or sparse edge; the
//! node it lands on may carry an action that records a binder or marks
//! the pattern as undecodable. Both roots are built once per process.

use once_cell::sync::Lazy;

use super::fields::{
    bit, displacement, io5, io6, k12, k16, k22, k6, k7, k8, pair_d, pair_r, rd3, rd4, rd5, rr3,
    rr4, rr5, word_reg, yz, Window,
};
use crate::addr_mode::{
    AbsJump, Branch, HighHigh, HighImm, Implied, IoBit, IoReg, LdDirect, LdDisp, LdInd, LdPostInc,
    LdPreDec, LoadZ, LoadZPostInc, MidMid, PairPair, Reg, RegBit, RegIo, RegReg, RelJump, StDirect,
    StDisp, StInd, StPostInc, StPreDec, WordImm,
};
use crate::instr::Instr;
use crate::operand::{Indirect, PostIncrement, PreDecrement, ZIndirect, ZPostIncrement};
use crate::symbol::PointerRegister;

/// Index into the node arena.
pub type NodeId = usize;

/// Operand reader plus constructor for one mnemonic.
#[derive(Clone, Copy)]
pub struct Binder {
    /// Reads the operand fields and builds the instruction.
    pub build: fn(&Window) -> Instr,
    /// Encoded size in bytes.
    pub size: u8,
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder").field("size", &self.size).finish_non_exhaustive()
    }
}

/// Effect of entering a node.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    /// Nothing recorded.
    None,
    /// The pattern is not an instruction.
    Error,
    /// Record the binder that will build the instruction.
    Bind(Binder),
}

/// Outgoing edges of a branch node.
#[derive(Debug)]
pub enum Edges {
    /// Indexed directly by the extracted value.
    Dense(Box<[NodeId]>),
    /// Sorted `(value, child)` pairs with a fallback child.
    Sparse {
        /// Sorted by value.
        table: Box<[(u16, NodeId)]>,
        /// Child for values absent from the table.
        default: NodeId,
    },
}

impl Edges {
    fn follow(&self, value: u16) -> Option<NodeId> {
        match self {
            Self::Dense(children) => children.get(usize::from(value)).copied(),
            Self::Sparse { table, default } => Some(
                table
                    .binary_search_by_key(&value, |&(key, _)| key)
                    .map_or(*default, |index| table[index].1),
            ),
        }
    }
}

/// Decision-tree node.
#[derive(Debug)]
pub enum Node {
    /// Interior node selecting a child from a bit field of `word0`.
    Branch {
        /// Right shift applied before masking.
        left_bit: u8,
        /// Field mask after shifting; need not be contiguous.
        mask: u16,
        /// Children.
        edges: Edges,
        /// Effect of entering this node.
        action: Action,
    },
    /// Leaf: descent stops here.
    Terminal {
        /// Effect of entering this node.
        action: Action,
    },
}

impl Node {
    /// Action run when the node is entered.
    pub const fn action(&self) -> Action {
        match self {
            Self::Branch { action, .. } | Self::Terminal { action } => *action,
        }
    }

    /// Child selected by `word0`, or `None` for a terminal or an absent dense slot.
    pub fn transition(&self, word0: u16) -> Option<NodeId> {
        match self {
            Self::Branch {
                left_bit,
                mask,
                edges,
                ..
            } => edges.follow((word0 >> left_bit) & mask),
            Self::Terminal { .. } => None,
        }
    }
}

/// Both decode roots and the arena they index.
#[derive(Debug)]
pub struct DecodeTree {
    nodes: Vec<Node>,
    /// Root over the whole encoding space (top nibble).
    pub root0: NodeId,
    /// Root over the `1001 xxxx` sub-space, reached from `root0`.
    pub root1: NodeId,
}

impl DecodeTree {
    /// Root the walk for `word0` starts from: `1001 ....` words enter
    /// `root1` directly, skipping the top-nibble dispatch.
    pub const fn root_for(&self, word0: u16) -> NodeId {
        if word0 >> 12 == 0x9 {
            self.root1
        } else {
            self.root0
        }
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Number of nodes in the arena.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Process-wide decode tree.
pub static TREE: Lazy<DecodeTree> = Lazy::new(build_tree);

struct TreeBuilder {
    nodes: Vec<Node>,
    error: NodeId,
}

impl TreeBuilder {
    fn new() -> Self {
        let mut builder = Self {
            nodes: Vec::with_capacity(256),
            error: 0,
        };
        builder.error = builder.push(Node::Terminal {
            action: Action::Error,
        });
        builder
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn leaf(&mut self, build: fn(&Window) -> Instr, size: u8) -> NodeId {
        self.push(Node::Terminal {
            action: Action::Bind(Binder { build, size }),
        })
    }

    fn one(&mut self, build: fn(&Window) -> Instr) -> NodeId {
        self.leaf(build, 2)
    }

    fn two(&mut self, build: fn(&Window) -> Instr) -> NodeId {
        self.leaf(build, 4)
    }

    fn dense(&mut self, left_bit: u8, mask: u16, children: Vec<NodeId>) -> NodeId {
        debug_assert_eq!(children.len(), usize::from(mask) + 1);
        self.push(Node::Branch {
            left_bit,
            mask,
            edges: Edges::Dense(children.into_boxed_slice()),
            action: Action::None,
        })
    }

    fn sparse(&mut self, left_bit: u8, mask: u16, table: Vec<(u16, NodeId)>) -> NodeId {
        self.sparse_or(left_bit, mask, table, self.error)
    }

    fn sparse_or(
        &mut self,
        left_bit: u8,
        mask: u16,
        mut table: Vec<(u16, NodeId)>,
        default: NodeId,
    ) -> NodeId {
        table.sort_unstable_by_key(|&(value, _)| value);
        self.push(Node::Branch {
            left_bit,
            mask,
            edges: Edges::Sparse {
                table: table.into_boxed_slice(),
                default,
            },
            action: Action::None,
        })
    }
}

const fn reg_reg(w: &Window) -> RegReg {
    RegReg {
        rd: rd5(w),
        rr: rr5(w),
    }
}

const fn reg(w: &Window) -> Reg {
    Reg { rd: rd5(w) }
}

const fn high_imm(w: &Window) -> HighImm {
    HighImm {
        rd: rd4(w),
        k: k8(w),
    }
}

const fn mid_mid(w: &Window) -> MidMid {
    MidMid {
        rd: rd3(w),
        rr: rr3(w),
    }
}

const fn reg_bit(w: &Window) -> RegBit {
    RegBit {
        rd: rd5(w),
        bit: bit(w),
    }
}

const fn io_bit(w: &Window) -> IoBit {
    IoBit {
        io: io5(w),
        bit: bit(w),
    }
}

const fn word_imm(w: &Window) -> WordImm {
    WordImm {
        rd: word_reg(w),
        k: k6(w),
    }
}

fn branch(w: &Window) -> Branch {
    Branch { target: k7(w) }
}

const fn ld(w: &Window, pointer: PointerRegister) -> LdInd {
    LdInd {
        rd: rd5(w),
        src: Indirect::new(pointer),
    }
}

const fn ld_pi(w: &Window, pointer: PointerRegister) -> LdPostInc {
    LdPostInc {
        rd: rd5(w),
        src: PostIncrement::new(pointer),
    }
}

const fn ld_pd(w: &Window, pointer: PointerRegister) -> LdPreDec {
    LdPreDec {
        rd: rd5(w),
        src: PreDecrement::new(pointer),
    }
}

const fn st(w: &Window, pointer: PointerRegister) -> StInd {
    StInd {
        dst: Indirect::new(pointer),
        rr: rd5(w),
    }
}

const fn st_pi(w: &Window, pointer: PointerRegister) -> StPostInc {
    StPostInc {
        dst: PostIncrement::new(pointer),
        rr: rd5(w),
    }
}

const fn st_pd(w: &Window, pointer: PointerRegister) -> StPreDec {
    StPreDec {
        dst: PreDecrement::new(pointer),
        rr: rd5(w),
    }
}

const fn load_z(w: &Window) -> LoadZ {
    LoadZ {
        rd: rd5(w),
        src: ZIndirect,
    }
}

const fn load_z_pi(w: &Window) -> LoadZPostInc {
    LoadZPostInc {
        rd: rd5(w),
        src: ZPostIncrement,
    }
}

const IMPLIED: Implied = Implied {};

#[allow(clippy::too_many_lines)]
fn build_tree() -> DecodeTree {
    let mut t = TreeBuilder::new();

    // 0000 xxxx: NOP, MOVW, MULS, MULSU/FMUL*, then CPC/SBC/ADD.
    let nop = t.one(|_| Instr::Nop(IMPLIED));
    let nop = t.sparse(0, 0xFF, vec![(0, nop)]);
    let movw = t.one(|w| {
        Instr::Movw(PairPair {
            rd: pair_d(w),
            rr: pair_r(w),
        })
    });
    let muls = t.one(|w| {
        Instr::Muls(HighHigh {
            rd: rd4(w),
            rr: rr4(w),
        })
    });
    let mulsu = t.one(|w| Instr::Mulsu(mid_mid(w)));
    let fmul = t.one(|w| Instr::Fmul(mid_mid(w)));
    let fmuls = t.one(|w| Instr::Fmuls(mid_mid(w)));
    let fmulsu = t.one(|w| Instr::Fmulsu(mid_mid(w)));
    let mul_family = t.sparse(
        3,
        0x11,
        vec![(0x00, mulsu), (0x01, fmul), (0x10, fmuls), (0x11, fmulsu)],
    );
    let group00 = t.dense(8, 0x3, vec![nop, movw, muls, mul_family]);
    let cpc = t.one(|w| Instr::Cpc(reg_reg(w)));
    let sbc = t.one(|w| Instr::Sbc(reg_reg(w)));
    let add = t.one(|w| Instr::Add(reg_reg(w)));
    let nibble0 = t.dense(10, 0x3, vec![group00, cpc, sbc, add]);

    let cpse = t.one(|w| Instr::Cpse(reg_reg(w)));
    let cp = t.one(|w| Instr::Cp(reg_reg(w)));
    let sub = t.one(|w| Instr::Sub(reg_reg(w)));
    let adc = t.one(|w| Instr::Adc(reg_reg(w)));
    let nibble1 = t.dense(10, 0x3, vec![cpse, cp, sub, adc]);

    let and = t.one(|w| Instr::And(reg_reg(w)));
    let eor = t.one(|w| Instr::Eor(reg_reg(w)));
    let or = t.one(|w| Instr::Or(reg_reg(w)));
    let mov = t.one(|w| Instr::Mov(reg_reg(w)));
    let nibble2 = t.dense(10, 0x3, vec![and, eor, or, mov]);

    let cpi = t.one(|w| Instr::Cpi(high_imm(w)));
    let sbci = t.one(|w| Instr::Sbci(high_imm(w)));
    let subi = t.one(|w| Instr::Subi(high_imm(w)));
    let ori = t.one(|w| Instr::Ori(high_imm(w)));
    let andi = t.one(|w| Instr::Andi(high_imm(w)));

    // 10q0 qqsd dddd yqqq: displacement zero is the plain LD/ST form.
    let ldd = t.one(|w| {
        Instr::Ldd(LdDisp {
            rd: rd5(w),
            src: displacement(w),
        })
    });
    let std = t.one(|w| {
        Instr::Std(StDisp {
            dst: displacement(w),
            rr: rd5(w),
        })
    });
    let ld_yz = t.one(|w| Instr::Ld(ld(w, yz(w).pointer())));
    let st_yz = t.one(|w| Instr::St(st(w, yz(w).pointer())));
    let ld_q = t.sparse_or(0, 0x2C07, vec![(0, ld_yz)], ldd);
    let st_q = t.sparse_or(0, 0x2C07, vec![(0, st_yz)], std);
    let nibble8 = t.dense(9, 0x1, vec![ld_q, st_q]);
    let nibble_a = t.dense(9, 0x1, vec![ldd, std]);

    let root1 = build_root1(&mut t);

    let in_ = t.one(|w| {
        Instr::In(RegIo {
            rd: rd5(w),
            io: io6(w),
        })
    });
    let out = t.one(|w| {
        Instr::Out(IoReg {
            io: io6(w),
            rr: rd5(w),
        })
    });
    let nibble_b = t.dense(11, 0x1, vec![in_, out]);

    let rjmp = t.one(|w| Instr::Rjmp(RelJump { target: k12(w) }));
    let rcall = t.one(|w| Instr::Rcall(RelJump { target: k12(w) }));
    let ldi = t.one(|w| Instr::Ldi(high_imm(w)));

    // 1111 0xkk kkkk ksss: the status bit selects the named branch.
    let set_branches = vec![
        t.one(|w| Instr::Brcs(branch(w))),
        t.one(|w| Instr::Breq(branch(w))),
        t.one(|w| Instr::Brmi(branch(w))),
        t.one(|w| Instr::Brvs(branch(w))),
        t.one(|w| Instr::Brlt(branch(w))),
        t.one(|w| Instr::Brhs(branch(w))),
        t.one(|w| Instr::Brts(branch(w))),
        t.one(|w| Instr::Brie(branch(w))),
    ];
    let clear_branches = vec![
        t.one(|w| Instr::Brcc(branch(w))),
        t.one(|w| Instr::Brne(branch(w))),
        t.one(|w| Instr::Brpl(branch(w))),
        t.one(|w| Instr::Brvc(branch(w))),
        t.one(|w| Instr::Brge(branch(w))),
        t.one(|w| Instr::Brhc(branch(w))),
        t.one(|w| Instr::Brtc(branch(w))),
        t.one(|w| Instr::Brid(branch(w))),
    ];
    let brbs = t.dense(0, 0x7, set_branches);
    let brbc = t.dense(0, 0x7, clear_branches);
    let bld = t.one(|w| Instr::Bld(reg_bit(w)));
    let bst = t.one(|w| Instr::Bst(reg_bit(w)));
    let sbrc = t.one(|w| Instr::Sbrc(reg_bit(w)));
    let sbrs = t.one(|w| Instr::Sbrs(reg_bit(w)));
    // Bit 3 must be clear; bit 9 picks the second mnemonic of each pair.
    let bld_bst = t.sparse(3, 0x41, vec![(0x00, bld), (0x40, bst)]);
    let sbrc_sbrs = t.sparse(3, 0x41, vec![(0x00, sbrc), (0x40, sbrs)]);
    let nibble_f = t.dense(10, 0x3, vec![brbs, brbc, bld_bst, sbrc_sbrs]);

    let root0 = t.dense(
        12,
        0xF,
        vec![
            nibble0, nibble1, nibble2, cpi, sbci, subi, ori, andi, nibble8, root1, nibble_a,
            nibble_b, rjmp, rcall, ldi, nibble_f,
        ],
    );

    DecodeTree {
        nodes: t.nodes,
        root0,
        root1,
    }
}

#[allow(clippy::too_many_lines)]
fn build_root1(t: &mut TreeBuilder) -> NodeId {
    use PointerRegister::{X, Y, Z};

    let err = t.error;

    // 1001 000d dddd xxxx
    let lds = t.two(|w| {
        Instr::Lds(LdDirect {
            rd: rd5(w),
            addr: k16(w),
        })
    });
    let loads = vec![
        lds,
        t.one(|w| Instr::LdPi(ld_pi(w, Z))),
        t.one(|w| Instr::LdPd(ld_pd(w, Z))),
        err,
        t.one(|w| Instr::LpmD(load_z(w))),
        t.one(|w| Instr::LpmPi(load_z_pi(w))),
        t.one(|w| Instr::ElpmD(load_z(w))),
        t.one(|w| Instr::ElpmPi(load_z_pi(w))),
        err,
        t.one(|w| Instr::LdPi(ld_pi(w, Y))),
        t.one(|w| Instr::LdPd(ld_pd(w, Y))),
        err,
        t.one(|w| Instr::Ld(ld(w, X))),
        t.one(|w| Instr::LdPi(ld_pi(w, X))),
        t.one(|w| Instr::LdPd(ld_pd(w, X))),
        t.one(|w| Instr::Pop(reg(w))),
    ];
    let loads = t.dense(0, 0xF, loads);

    // 1001 001r rrrr xxxx
    let sts = t.two(|w| {
        Instr::Sts(StDirect {
            addr: k16(w),
            rr: rd5(w),
        })
    });
    let stores = vec![
        sts,
        t.one(|w| Instr::StPi(st_pi(w, Z))),
        t.one(|w| Instr::StPd(st_pd(w, Z))),
        err,
        err,
        err,
        err,
        err,
        err,
        t.one(|w| Instr::StPi(st_pi(w, Y))),
        t.one(|w| Instr::StPd(st_pd(w, Y))),
        err,
        t.one(|w| Instr::St(st(w, X))),
        t.one(|w| Instr::StPi(st_pi(w, X))),
        t.one(|w| Instr::StPd(st_pd(w, X))),
        t.one(|w| Instr::Push(reg(w))),
    ];
    let stores = t.dense(0, 0xF, stores);

    // 1001 010x xxxx 1000: flag aliases, returns, MCU control, LPM/ELPM/SPM.
    let misc8 = vec![
        t.one(|_| Instr::Sec(IMPLIED)),
        t.one(|_| Instr::Sez(IMPLIED)),
        t.one(|_| Instr::Sen(IMPLIED)),
        t.one(|_| Instr::Sev(IMPLIED)),
        t.one(|_| Instr::Ses(IMPLIED)),
        t.one(|_| Instr::Seh(IMPLIED)),
        t.one(|_| Instr::Set(IMPLIED)),
        t.one(|_| Instr::Sei(IMPLIED)),
        t.one(|_| Instr::Clc(IMPLIED)),
        t.one(|_| Instr::Clz(IMPLIED)),
        t.one(|_| Instr::Cln(IMPLIED)),
        t.one(|_| Instr::Clv(IMPLIED)),
        t.one(|_| Instr::Cls(IMPLIED)),
        t.one(|_| Instr::Clh(IMPLIED)),
        t.one(|_| Instr::Clt(IMPLIED)),
        t.one(|_| Instr::Cli(IMPLIED)),
        t.one(|_| Instr::Ret(IMPLIED)),
        t.one(|_| Instr::Reti(IMPLIED)),
        err,
        err,
        err,
        err,
        err,
        err,
        t.one(|_| Instr::Sleep(IMPLIED)),
        t.one(|_| Instr::Break(IMPLIED)),
        t.one(|_| Instr::Wdr(IMPLIED)),
        err,
        t.one(|_| Instr::Lpm(IMPLIED)),
        t.one(|_| Instr::Elpm(IMPLIED)),
        t.one(|_| Instr::Spm(IMPLIED)),
        err,
    ];
    let misc8 = t.dense(4, 0x1F, misc8);

    // 1001 010x xxxx 1001: indirect jumps and calls.
    let ijmp = t.one(|_| Instr::Ijmp(IMPLIED));
    let eijmp = t.one(|_| Instr::Eijmp(IMPLIED));
    let icall = t.one(|_| Instr::Icall(IMPLIED));
    let eicall = t.one(|_| Instr::Eicall(IMPLIED));
    let misc9 = t.sparse(
        4,
        0x1F,
        vec![(0x00, ijmp), (0x01, eijmp), (0x10, icall), (0x11, eicall)],
    );

    let jmp = t.two(|w| Instr::Jmp(AbsJump { target: k22(w) }));
    let call = t.two(|w| Instr::Call(AbsJump { target: k22(w) }));
    let singles = vec![
        t.one(|w| Instr::Com(reg(w))),
        t.one(|w| Instr::Neg(reg(w))),
        t.one(|w| Instr::Swap(reg(w))),
        t.one(|w| Instr::Inc(reg(w))),
        err,
        t.one(|w| Instr::Asr(reg(w))),
        t.one(|w| Instr::Lsr(reg(w))),
        t.one(|w| Instr::Ror(reg(w))),
        misc8,
        misc9,
        t.one(|w| Instr::Dec(reg(w))),
        err,
        jmp,
        jmp,
        call,
        call,
    ];
    let singles = t.dense(0, 0xF, singles);

    let adiw = t.one(|w| Instr::Adiw(word_imm(w)));
    let sbiw = t.one(|w| Instr::Sbiw(word_imm(w)));
    let word_ops = t.dense(8, 0x1, vec![adiw, sbiw]);

    let cbi = t.one(|w| Instr::Cbi(io_bit(w)));
    let sbic = t.one(|w| Instr::Sbic(io_bit(w)));
    let sbi = t.one(|w| Instr::Sbi(io_bit(w)));
    let sbis = t.one(|w| Instr::Sbis(io_bit(w)));
    let cbi_sbic = t.dense(8, 0x1, vec![cbi, sbic]);
    let sbi_sbis = t.dense(8, 0x1, vec![sbi, sbis]);

    let mul = t.one(|w| Instr::Mul(reg_reg(w)));

    t.dense(
        9,
        0x7,
        vec![loads, stores, singles, word_ops, cbi_sbic, sbi_sbis, mul, mul],
    )
}

#[cfg(test)]
mod tests {
    use super::{Action, Node, TREE};

    #[test]
    fn roots_are_branch_nodes() {
        assert!(matches!(TREE.node(TREE.root0), Node::Branch { .. }));
        assert!(matches!(TREE.node(TREE.root1), Node::Branch { .. }));
        assert!(TREE.len() > 130);
    }

    #[test]
    fn second_root_is_the_top_nibble_nine_edge() {
        assert_eq!(TREE.node(TREE.root0).transition(0x9000), Some(TREE.root1));
        assert_eq!(TREE.root_for(0x95C8), TREE.root1);
        assert_eq!(TREE.root_for(0x0C56), TREE.root0);
    }

    #[test]
    fn shared_error_leaf_marks_failure() {
        let reserved = TREE
            .node(TREE.root1)
            .transition(0x9000)
            .and_then(|loads| TREE.node(loads).transition(0x9003));
        let reserved = reserved.expect("dense slot exists");
        assert!(matches!(TREE.node(reserved).action(), Action::Error));
    }
}
