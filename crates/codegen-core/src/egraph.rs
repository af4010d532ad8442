//! Equality-saturation e-graph: e-nodes, e-classes, union-find, hash-consing,
//! congruence-closure rebuild, an IR-to-e-graph builder, a rewrite-rule
//! system ("rules are data"), a fixed-order saturation driver, and a
//! minimal greedy extractor (spec §4.7/4.8).
//!
//! New module — the teacher's Mu IR has no optimizer at all (bytecode goes
//! straight from loader to interpreter), so there is no teacher analogue.
//! Deliberately simpler than the real `cranelift-egraph`/`aegraph` crate
//! retrieved into `other_examples/…egraph.rs.rs` and `…egraph-node.rs.rs`
//! (no generational `Id` arena, no loop-analysis integration, no alias
//! analysis — the spec explicitly does not ask for those); kept as one
//! module rather than mirroring that crate's six-file split, since this
//! e-graph is small enough that splitting it would scatter a handful of
//! tightly-coupled types across files for no readability gain. `FxHashMap`
//! for the hashcons table is grounded on the same real egraph module's
//! `fx::FxHashMap` usage (see `DESIGN.md`).

use std::collections::HashMap;

use cranelift_entity::{entity_impl, EntityRef};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::Value;
use crate::ir::function::Function;
use crate::ir::instructions::InstructionData;
use crate::ir::opcode::Opcode;

/// An e-class identifier.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u32);
entity_impl!(Id, "eclass");

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CmpKind {
    Int(IntCC),
    Float(FloatCC),
}

/// An e-node: `Op(opcode, canonical children)`, a comparison (kept apart
/// from `Op` because the condition code, not just the opcode, determines
/// its semantics — needed for the comparison-self-reflection rule family),
/// or one of two leaf kinds. The e-node type carries a constant payload
/// from the start (`Const(i64)`) rather than the source's payload-free
/// approximation — see `SPEC_FULL.md` §G's "constant payload" decision.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ENode {
    Op(Opcode, SmallVec<[Id; 3]>),
    Cmp(CmpKind, Id, Id),
    Const(i64),
    /// A value the builder could not interpret (an unhandled instruction
    /// format, or a block parameter): wraps the source `Value` itself so
    /// hash-consing never conflates two distinct opaque values.
    Opaque(Value),
}

#[derive(Default, Clone)]
struct EClassData {
    nodes: Vec<ENode>,
    /// e-nodes that reference this class, paired with the e-class they
    /// themselves currently live in. Used by `rebuild` to repair congruence.
    parents: Vec<(ENode, Id)>,
}

/// An equality-saturation e-graph over opcode-tagged e-nodes.
pub struct EGraph {
    union_find: Vec<Id>,
    classes: HashMap<Id, EClassData>,
    hashcons: FxHashMap<ENode, Id>,
    worklist: Vec<Id>,
}

impl Default for EGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EGraph {
    pub fn new() -> Self {
        EGraph { union_find: Vec::new(), classes: HashMap::new(), hashcons: FxHashMap::default(), worklist: Vec::new() }
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Canonicalize `id` without path compression; safe to call from `&self`
    /// contexts (queries run between saturation rounds, not inside them).
    pub fn find(&self, mut id: Id) -> Id {
        while self.union_find[id.index()] != id {
            id = self.union_find[id.index()];
        }
        id
    }

    /// Canonicalize `id` with path halving.
    fn find_mut(&mut self, mut id: Id) -> Id {
        while self.union_find[id.index()] != id {
            let parent = self.union_find[id.index()];
            let grandparent = self.union_find[parent.index()];
            self.union_find[id.index()] = grandparent;
            id = grandparent;
        }
        id
    }

    pub fn add_op(&mut self, opcode: Opcode, children: &[Id]) -> Id {
        let canon: SmallVec<[Id; 3]> = children.iter().map(|&c| self.find_mut(c)).collect();
        self.add_node(ENode::Op(opcode, canon))
    }

    pub fn add_cmp(&mut self, kind: CmpKind, lhs: Id, rhs: Id) -> Id {
        let lhs = self.find_mut(lhs);
        let rhs = self.find_mut(rhs);
        self.add_node(ENode::Cmp(kind, lhs, rhs))
    }

    pub fn add_const(&mut self, value: i64) -> Id {
        self.add_node(ENode::Const(value))
    }

    pub fn add_opaque(&mut self, value: Value) -> Id {
        self.add_node(ENode::Opaque(value))
    }

    fn node_children(node: &ENode) -> SmallVec<[Id; 3]> {
        match node {
            ENode::Op(_, children) => children.clone(),
            ENode::Cmp(_, a, b) => smallvec![*a, *b],
            ENode::Const(_) | ENode::Opaque(_) => SmallVec::new(),
        }
    }

    /// `add(op, children)` (spec §4.7): canonicalize, hash-cons, or allocate
    /// a fresh singleton class and record this node on every child's
    /// `parents` list.
    fn add_node(&mut self, node: ENode) -> Id {
        if let Some(&id) = self.hashcons.get(&node) {
            return self.find_mut(id);
        }
        let id = Id::new(self.union_find.len());
        self.union_find.push(id);
        for child in Self::node_children(&node) {
            let root = self.find_mut(child);
            self.classes.entry(root).or_default().parents.push((node.clone(), id));
        }
        self.classes.entry(id).or_default().nodes.push(node.clone());
        self.hashcons.insert(node, id);
        id
    }

    /// `merge(a, b)` (spec §4.7): deterministic `union_by_id` — the
    /// numerically smaller root always survives, so hash-consing stays
    /// reproducible regardless of merge order.
    pub fn merge(&mut self, a: Id, b: Id) -> Id {
        let ra = self.find_mut(a);
        let rb = self.find_mut(b);
        if ra == rb {
            return ra;
        }
        let (keep, drop) = if ra.index() < rb.index() { (ra, rb) } else { (rb, ra) };
        self.union_find[drop.index()] = keep;
        let dropped = self.classes.remove(&drop).unwrap_or_default();
        let kept = self.classes.entry(keep).or_default();
        kept.nodes.extend(dropped.nodes);
        kept.parents.extend(dropped.parents);
        self.worklist.push(keep);
        keep
    }

    /// `rebuild()` (spec §4.7): drain the worklist, canonicalizing each
    /// repaired class's parent e-nodes and re-checking the hashcons table so
    /// that congruent parents (`f(a)` and `f(b)` once `a == b`) get merged
    /// too, enqueuing further work until the worklist empties.
    pub fn rebuild(&mut self) {
        while let Some(id) = self.worklist.pop() {
            let id = self.find_mut(id);
            self.repair(id);
        }
    }

    fn repair(&mut self, class: Id) {
        let parents = std::mem::take(&mut self.classes.entry(class).or_default().parents);
        for (node, _) in &parents {
            self.hashcons.remove(node);
        }

        let mut repaired: Vec<(ENode, Id)> = Vec::with_capacity(parents.len());
        for (node, parent_class) in parents {
            let canon_node = self.canonicalize(&node);
            let parent_class = self.find_mut(parent_class);

            if let Some(&existing) = self.hashcons.get(&canon_node) {
                let existing = self.find_mut(existing);
                if existing != parent_class {
                    // Congruence: two e-nodes that used to look different now
                    // canonicalize to the same node, so their classes must
                    // become one. A guard against `existing == parent_class`
                    // avoids the infinite self-merge the spec's open
                    // questions warn about (see `SPEC_FULL.md` §G).
                    let merged = self.merge(existing, parent_class);
                    self.hashcons.insert(canon_node.clone(), merged);
                    repaired.push((canon_node, merged));
                    continue;
                }
            }
            self.hashcons.insert(canon_node.clone(), parent_class);
            repaired.push((canon_node, parent_class));
        }

        let class = self.find_mut(class);
        self.classes.entry(class).or_default().parents.extend(repaired);
    }

    fn canonicalize(&mut self, node: &ENode) -> ENode {
        match node {
            ENode::Op(op, children) => ENode::Op(*op, children.iter().map(|&c| self.find_mut(c)).collect()),
            ENode::Cmp(kind, a, b) => ENode::Cmp(*kind, self.find_mut(*a), self.find_mut(*b)),
            ENode::Const(v) => ENode::Const(*v),
            ENode::Opaque(v) => ENode::Opaque(*v),
        }
    }

    pub fn nodes(&self, id: Id) -> &[ENode] {
        self.classes.get(&self.find(id)).map(|c| c.nodes.as_slice()).unwrap_or(&[])
    }

    /// Reads the payload directly, per `SPEC_FULL.md` §G: never the
    /// unsound string-free approximation the spec flags as a defect.
    pub fn is_constant_zero(&self, id: Id) -> bool {
        self.constant_payload(id) == Some(0)
    }

    pub fn is_constant_one(&self, id: Id) -> bool {
        self.constant_payload(id) == Some(1)
    }

    fn constant_payload(&self, id: Id) -> Option<i64> {
        self.nodes(id).iter().find_map(|n| match n {
            ENode::Const(v) => Some(*v),
            _ => None,
        })
    }
}

/// Traverses `func` in layout order, mapping each `Value` to an e-class id.
/// Operand conversion handles `{unary, binary, ternary, int_compare, iconst,
/// f*const, nullary}`; unknown formats fall back to an opaque leaf (spec
/// §4.7's "Builder from IR").
pub fn build_from_function(func: &Function) -> (EGraph, HashMap<Value, Id>) {
    let mut egraph = EGraph::new();
    let mut map: HashMap<Value, Id> = HashMap::new();

    fn value_id(egraph: &mut EGraph, map: &mut HashMap<Value, Id>, v: Value) -> Id {
        if let Some(&id) = map.get(&v) {
            return id;
        }
        let id = egraph.add_opaque(v);
        map.insert(v, id);
        id
    }

    for block in func.layout.blocks() {
        for &p in func.dfg.block_params(block) {
            value_id(&mut egraph, &mut map, p);
        }
        for inst in func.layout.block_insts(block) {
            let data = &func.dfg.insts[inst];
            let results = func.dfg.inst_results(inst);
            let Some(&result) = results.first() else { continue };

            let id = match data {
                InstructionData::Nullary { opcode } => egraph.add_op(*opcode, &[]),
                InstructionData::UnaryImm { opcode: Opcode::Iconst, imm } => egraph.add_const(*imm),
                InstructionData::UnaryIeee32 { imm, .. } => egraph.add_const(*imm as i64),
                InstructionData::UnaryIeee64 { imm, .. } => egraph.add_const(*imm as i64),
                InstructionData::Unary { opcode, arg } => {
                    let a = value_id(&mut egraph, &mut map, *arg);
                    egraph.add_op(*opcode, &[a])
                }
                InstructionData::Binary { opcode, args } => {
                    let a = value_id(&mut egraph, &mut map, args[0]);
                    let b = value_id(&mut egraph, &mut map, args[1]);
                    egraph.add_op(*opcode, &[a, b])
                }
                InstructionData::Ternary { opcode, args } => {
                    let a = value_id(&mut egraph, &mut map, args[0]);
                    let b = value_id(&mut egraph, &mut map, args[1]);
                    let c = value_id(&mut egraph, &mut map, args[2]);
                    egraph.add_op(*opcode, &[a, b, c])
                }
                InstructionData::IntCompare { cond, args } => {
                    let a = value_id(&mut egraph, &mut map, args[0]);
                    let b = value_id(&mut egraph, &mut map, args[1]);
                    egraph.add_cmp(CmpKind::Int(*cond), a, b)
                }
                InstructionData::FloatCompare { cond, args } => {
                    let a = value_id(&mut egraph, &mut map, args[0]);
                    let b = value_id(&mut egraph, &mut map, args[1]);
                    egraph.add_cmp(CmpKind::Float(*cond), a, b)
                }
                _ => egraph.add_opaque(result),
            };
            map.insert(result, id);
        }
    }

    (egraph, map)
}

/// A rewrite-rule pattern (spec §4.8). Patterns and actions are plain data
/// so the built-in rule set below is a table, not a pile of ad hoc
/// functions. A variable name repeated across a pattern (e.g. `x - x`)
/// must bind to the same e-class every time for the match to succeed.
#[derive(Clone, Debug)]
pub enum Pattern {
    /// Matches an e-node whose opcode and arity agree; binds each child to
    /// the name at the same position.
    Op { opcode: Opcode, vars: Vec<&'static str> },
    /// Matches `lhs cond rhs`, binding `lhs`/`rhs`.
    Cmp { kind: CmpKind, lhs: &'static str, rhs: &'static str },
    /// Matches a constant leaf with exactly this payload, optionally
    /// binding it too.
    Const { value: i64 },
    /// Matches anything and binds it to `name`.
    Var(&'static str),
}

#[derive(Clone)]
pub enum Action {
    /// Replace with whatever `name` was bound to.
    Var(&'static str),
    /// Replace with a freshly added constant.
    Const(i64),
    /// Replace with a freshly rebuilt operation over the named bindings.
    Op { opcode: Opcode, args: Vec<&'static str> },
    /// Escape hatch for rewrites whose result isn't a single flat
    /// `Op{opcode, args}` over the pattern's own bindings — strength
    /// reduction (the shift amount is *computed* from a constant's value,
    /// not a bound e-class), distributivity and De Morgan (the rewrite
    /// needs to look inside one binding's e-node to find sub-operands the
    /// single-level `Pattern` grammar never bound by name).
    Custom(fn(&mut EGraph, &Bindings) -> Id),
}

pub struct Rule {
    pub name: &'static str,
    pub pattern: Pattern,
    pub action: Action,
}

pub type Bindings = HashMap<&'static str, Id>;

fn bind(bindings: &mut Bindings, name: &'static str, id: Id) -> bool {
    match bindings.get(name) {
        Some(&existing) => existing == id,
        None => {
            bindings.insert(name, id);
            true
        }
    }
}

impl Pattern {
    /// Tries to match `self` against `id`, trying every e-node currently in
    /// that class (a class can hold several equivalent nodes).
    fn matches(&self, egraph: &EGraph, id: Id) -> Option<Bindings> {
        match self {
            Pattern::Var(name) => {
                let mut b = Bindings::new();
                bind(&mut b, name, id);
                Some(b)
            }
            Pattern::Const { value } => {
                egraph.nodes(id).iter().any(|n| matches!(n, ENode::Const(v) if v == value)).then(Bindings::new)
            }
            Pattern::Op { opcode, vars } => egraph.nodes(id).iter().find_map(|n| match n {
                ENode::Op(op, children) if op == opcode && children.len() == vars.len() => {
                    let mut b = Bindings::new();
                    let ok = vars.iter().zip(children.iter()).all(|(&name, &child)| bind(&mut b, name, child));
                    ok.then_some(b)
                }
                _ => None,
            }),
            Pattern::Cmp { kind, lhs, rhs } => egraph.nodes(id).iter().find_map(|n| match n {
                ENode::Cmp(k, a, b) if k == kind => {
                    let mut bindings = Bindings::new();
                    let ok = bind(&mut bindings, lhs, *a) && bind(&mut bindings, rhs, *b);
                    ok.then_some(bindings)
                }
                _ => None,
            }),
        }
    }
}

impl Action {
    fn build(&self, egraph: &mut EGraph, bindings: &Bindings) -> Id {
        match self {
            Action::Var(name) => bindings[name],
            Action::Const(value) => egraph.add_const(*value),
            Action::Op { opcode, args } => {
                let children: Vec<Id> = args.iter().map(|a| bindings[a]).collect();
                egraph.add_op(*opcode, &children)
            }
            Action::Custom(f) => f(egraph, bindings),
        }
    }
}

/// A rule may additionally demand that some bound variable is a specific
/// constant; plain `Pattern::Op` can't express "and this child is 0", so
/// rules needing that carry an extra guard evaluated after the structural
/// match succeeds.
pub struct GuardedRule {
    pub rule: Rule,
    pub guard: Option<fn(&EGraph, &Bindings) -> bool>,
}

/// Applies `rule` to every current e-class; returns `true` if any merge
/// happened. Iterates over a snapshot of class ids so matches found before
/// any merge in this pass still see a stable class-id space.
fn apply_rule(egraph: &mut EGraph, rule: &GuardedRule) -> bool {
    let roots: Vec<Id> = egraph.classes.keys().copied().collect();
    let mut changed = false;
    for id in roots {
        let id = egraph.find(id);
        let Some(bindings) = rule.rule.pattern.matches(egraph, id) else { continue };
        if let Some(guard) = rule.guard {
            if !guard(egraph, &bindings) {
                continue;
            }
        }
        let rewritten = rule.rule.action.build(egraph, &bindings);
        if egraph.find(id) != egraph.find(rewritten) {
            egraph.merge(id, rewritten);
            changed = true;
        }
    }
    changed
}

macro_rules! guard_fn {
    ($name:ident, $var:literal, $value:literal) => {
        fn $name(egraph: &EGraph, bindings: &Bindings) -> bool {
            bindings.get($var).is_some_and(|&id| egraph.constant_payload(id) == Some($value))
        }
    };
}

guard_fn!(guard_zero_right, "zero", 0);
guard_fn!(guard_zero_left, "zero", 0);
guard_fn!(guard_one_right, "one", 1);
guard_fn!(guard_one_left, "one", 1);

/// `Some(n)` if `v` is a positive power of two, i.e. `1 << n == v`.
fn power_of_two_shift(v: i64) -> Option<u32> {
    (v > 0 && (v as u64).is_power_of_two()).then(|| (v as u64).trailing_zeros())
}

fn guard_rhs_is_pow2(egraph: &EGraph, bindings: &Bindings) -> bool {
    bindings.get("c").and_then(|&id| egraph.constant_payload(id)).and_then(power_of_two_shift).is_some()
}

fn action_mul_to_shl(egraph: &mut EGraph, bindings: &Bindings) -> Id {
    let shift = power_of_two_shift(egraph.constant_payload(bindings["c"]).unwrap()).unwrap();
    let shift_id = egraph.add_const(shift as i64);
    egraph.add_op(Opcode::Ishl, &[bindings["x"], shift_id])
}

fn action_udiv_to_ushr(egraph: &mut EGraph, bindings: &Bindings) -> Id {
    let shift = power_of_two_shift(egraph.constant_payload(bindings["c"]).unwrap()).unwrap();
    let shift_id = egraph.add_const(shift as i64);
    egraph.add_op(Opcode::Ushr, &[bindings["x"], shift_id])
}

fn action_urem_to_mask(egraph: &mut EGraph, bindings: &Bindings) -> Id {
    let c = egraph.constant_payload(bindings["c"]).unwrap();
    let mask_id = egraph.add_const(c - 1);
    egraph.add_op(Opcode::Band, &[bindings["x"], mask_id])
}

/// The single-level `Pattern` grammar binds `bc` as a whole e-class; finding
/// the `Iadd` e-node inside it (to pull out its own two children) is done
/// directly against that class's node list, by the guard and then again by
/// the action — there is no nested-pattern matcher to bind `b`/`c` for us.
fn find_binary_node(egraph: &EGraph, id: Id, opcode: Opcode) -> Option<(Id, Id)> {
    egraph.nodes(id).iter().find_map(|n| match n {
        ENode::Op(op, children) if *op == opcode && children.len() == 2 => Some((children[0], children[1])),
        _ => None,
    })
}

fn find_unary_node(egraph: &EGraph, id: Id, opcode: Opcode) -> Option<Id> {
    egraph.nodes(id).iter().find_map(|n| match n {
        ENode::Op(op, children) if *op == opcode && children.len() == 1 => Some(children[0]),
        _ => None,
    })
}

fn guard_rhs_is_sum(egraph: &EGraph, bindings: &Bindings) -> bool {
    bindings.get("bc").is_some_and(|&id| find_binary_node(egraph, id, Opcode::Iadd).is_some())
}

fn action_distribute_mul_over_add(egraph: &mut EGraph, bindings: &Bindings) -> Id {
    let a = bindings["a"];
    let (b, c) = find_binary_node(egraph, bindings["bc"], Opcode::Iadd).expect("guard ensured this exists");
    let ab = egraph.add_op(Opcode::Imul, &[a, b]);
    let ac = egraph.add_op(Opcode::Imul, &[a, c]);
    egraph.add_op(Opcode::Iadd, &[ab, ac])
}

fn guard_inner_is_and(egraph: &EGraph, bindings: &Bindings) -> bool {
    bindings.get("inner").is_some_and(|&id| find_binary_node(egraph, id, Opcode::Band).is_some())
}

fn action_de_morgan_and(egraph: &mut EGraph, bindings: &Bindings) -> Id {
    let (a, b) = find_binary_node(egraph, bindings["inner"], Opcode::Band).expect("guard ensured this exists");
    let not_a = egraph.add_op(Opcode::Bnot, &[a]);
    let not_b = egraph.add_op(Opcode::Bnot, &[b]);
    egraph.add_op(Opcode::Bor, &[not_a, not_b])
}

fn guard_inner_is_not(egraph: &EGraph, bindings: &Bindings) -> bool {
    bindings.get("inner").is_some_and(|&id| find_unary_node(egraph, id, Opcode::Bnot).is_some())
}

fn action_double_negation_bnot(egraph: &mut EGraph, bindings: &Bindings) -> Id {
    find_unary_node(egraph, bindings["inner"], Opcode::Bnot).expect("guard ensured this exists")
}

fn guard_inner_is_ineg(egraph: &EGraph, bindings: &Bindings) -> bool {
    bindings.get("inner").is_some_and(|&id| find_unary_node(egraph, id, Opcode::Ineg).is_some())
}

fn action_double_negation_ineg(egraph: &mut EGraph, bindings: &Bindings) -> Id {
    find_unary_node(egraph, bindings["inner"], Opcode::Ineg).expect("guard ensured this exists")
}

/// The built-in rule families from spec §4.8.
pub fn built_in_rules() -> Vec<GuardedRule> {
    use Opcode::*;
    use Pattern::Op as POp;
    use Action::{Const as AConst, Custom, Op as AOp, Var as AVar};

    let plain = |name, pattern, action| GuardedRule { rule: Rule { name, pattern, action }, guard: None };
    let guarded = |name, pattern, action, guard| GuardedRule { rule: Rule { name, pattern, action }, guard: Some(guard) };

    vec![
        // Identities.
        guarded("iadd_zero_right", POp { opcode: Iadd, vars: vec!["x", "zero"] }, AVar("x"), guard_zero_right),
        guarded("iadd_zero_left", POp { opcode: Iadd, vars: vec!["zero", "x"] }, AVar("x"), guard_zero_left),
        guarded("imul_one_right", POp { opcode: Imul, vars: vec!["x", "one"] }, AVar("x"), guard_one_right),
        guarded("imul_one_left", POp { opcode: Imul, vars: vec!["one", "x"] }, AVar("x"), guard_one_left),
        guarded("isub_zero", POp { opcode: Isub, vars: vec!["x", "zero"] }, AVar("x"), guard_zero_right),
        guarded("bor_zero_right", POp { opcode: Bor, vars: vec!["x", "zero"] }, AVar("x"), guard_zero_right),
        guarded("bxor_zero_right", POp { opcode: Bxor, vars: vec!["x", "zero"] }, AVar("x"), guard_zero_right),
        guarded(
            "band_all_ones_right",
            POp { opcode: Band, vars: vec!["x", "ones"] },
            AVar("x"),
            |egraph: &EGraph, bindings: &Bindings| {
                bindings.get("ones").is_some_and(|&id| egraph.constant_payload(id) == Some(-1))
            },
        ),
        // Absorbing.
        guarded("imul_zero_right", POp { opcode: Imul, vars: vec!["x", "zero"] }, AConst(0), guard_zero_right),
        guarded("band_zero_right", POp { opcode: Band, vars: vec!["x", "zero"] }, AConst(0), guard_zero_right),
        // Idempotence (`x`/`x` is a repeated pattern variable, so the
        // structural match alone already requires both operands to be the
        // same e-class; no extra guard is needed).
        plain("isub_self", POp { opcode: Isub, vars: vec!["x", "x"] }, AConst(0)),
        plain("bxor_self", POp { opcode: Bxor, vars: vec!["x", "x"] }, AConst(0)),
        plain("band_self", POp { opcode: Band, vars: vec!["x", "x"] }, AVar("x")),
        plain("bor_self", POp { opcode: Bor, vars: vec!["x", "x"] }, AVar("x")),
        // Commutativity: adds the swapped form to the same class so later
        // rules, and the extractor's cost model, can see either orientation.
        plain("iadd_commute", POp { opcode: Iadd, vars: vec!["a", "b"] }, AOp { opcode: Iadd, args: vec!["b", "a"] }),
        plain("imul_commute", POp { opcode: Imul, vars: vec!["a", "b"] }, AOp { opcode: Imul, args: vec!["b", "a"] }),
        plain("band_commute", POp { opcode: Band, vars: vec!["a", "b"] }, AOp { opcode: Band, args: vec!["b", "a"] }),
        plain("bor_commute", POp { opcode: Bor, vars: vec!["a", "b"] }, AOp { opcode: Bor, args: vec!["b", "a"] }),
        plain("bxor_commute", POp { opcode: Bxor, vars: vec!["a", "b"] }, AOp { opcode: Bxor, args: vec!["b", "a"] }),
        // Associativity: Cranelift-style rotation of a right-leaning chain
        // into a left-leaning one (and, by symmetry of the pattern, back
        // again under saturation) so distributivity/strength-reduction can
        // reach a constant subterm buried on either side of a chain.
        plain(
            "iadd_associate_left",
            POp { opcode: Iadd, vars: vec!["a", "bc"] },
            Custom(|egraph, bindings| {
                let a = bindings["a"];
                match find_binary_node(egraph, bindings["bc"], Iadd) {
                    Some((b, c)) => {
                        let ab = egraph.add_op(Iadd, &[a, b]);
                        egraph.add_op(Iadd, &[ab, c])
                    }
                    None => egraph.add_op(Iadd, &[a, bindings["bc"]]),
                }
            }),
        ),
        // Strength reduction: multiply/divide/remainder by a power of two.
        guarded("imul_pow2_to_shl", POp { opcode: Imul, vars: vec!["x", "c"] }, Custom(action_mul_to_shl), guard_rhs_is_pow2),
        guarded("udiv_pow2_to_ushr", POp { opcode: Udiv, vars: vec!["x", "c"] }, Custom(action_udiv_to_ushr), guard_rhs_is_pow2),
        guarded("urem_pow2_to_mask", POp { opcode: Urem, vars: vec!["x", "c"] }, Custom(action_urem_to_mask), guard_rhs_is_pow2),
        // Distributivity: a * (b + c) -> a*b + a*c.
        guarded(
            "distribute_mul_over_add",
            POp { opcode: Imul, vars: vec!["a", "bc"] },
            Custom(action_distribute_mul_over_add),
            guard_rhs_is_sum,
        ),
        // De Morgan: !(a & b) -> !a | !b.
        guarded("de_morgan_and", POp { opcode: Bnot, vars: vec!["inner"] }, Custom(action_de_morgan_and), guard_inner_is_and),
        // Double negation: !!x -> x, -(-x) -> x.
        guarded(
            "bnot_double",
            POp { opcode: Bnot, vars: vec!["inner"] },
            Custom(action_double_negation_bnot),
            guard_inner_is_not,
        ),
        guarded("ineg_double", POp { opcode: Ineg, vars: vec!["inner"] }, Custom(action_double_negation_ineg), guard_inner_is_ineg),
        // Comparison self-reflection: `x == x` is always true, `x != x` is
        // always false, regardless of `x`'s runtime value.
        GuardedRule {
            rule: Rule {
                name: "icmp_eq_self",
                pattern: Pattern::Cmp { kind: CmpKind::Int(IntCC::Equal), lhs: "x", rhs: "x" },
                action: AConst(1),
            },
            guard: None,
        },
        GuardedRule {
            rule: Rule {
                name: "icmp_ne_self",
                pattern: Pattern::Cmp { kind: CmpKind::Int(IntCC::NotEqual), lhs: "x", rhs: "x" },
                action: AConst(0),
            },
            guard: None,
        },
    ]
}

pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_NODE_LIMIT: usize = 10_000;

/// Bounds on the saturation driver (`SPEC_FULL.md` §D): a round cap and a
/// class-count cap, either of which stops saturation even if rules are
/// still finding rewrites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaturationConfig {
    pub max_iterations: usize,
    pub node_limit: usize,
}

impl Default for SaturationConfig {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS, node_limit: DEFAULT_NODE_LIMIT }
    }
}

/// Runs equality saturation (spec §4.8): apply every rule, in the fixed
/// order `rules` was given, to every e-class; `rebuild`; stop when a round
/// makes no merges, the class count exceeds `config.node_limit`, or
/// `config.max_iterations` is reached. Returns the number of iterations run.
pub fn saturate(egraph: &mut EGraph, rules: &[GuardedRule], config: SaturationConfig) -> usize {
    let mut iterations = 0;
    for _ in 0..config.max_iterations {
        iterations += 1;
        let classes_before = egraph.class_count();
        let mut changed = false;
        for rule in rules {
            if apply_rule(egraph, rule) {
                changed = true;
            }
        }
        egraph.rebuild();
        let classes_after = egraph.class_count();
        log::debug!(
            "egraph: saturation iteration {iterations}, {classes_after} class(es), rule fired: {changed}"
        );
        if classes_after > config.node_limit {
            log::warn!("egraph: saturation hit the {}-class node limit at iteration {iterations}", config.node_limit);
            break;
        }
        if !changed || classes_after == classes_before {
            break;
        }
    }
    if iterations >= config.max_iterations {
        log::warn!("egraph: saturation reached the {}-iteration cap without converging", config.max_iterations);
    }
    iterations
}

/// A minimal greedy extractor (`SPEC_FULL.md` §F.4): the cheapest e-node per
/// class, ties broken by the lower e-class id, with opcode arity as the
/// (trivial) cost model — opaque leaves and constants cost 0, every
/// operation costs 1 plus its children's costs.
pub fn extract(egraph: &EGraph, root: Id) -> ExtractedTerm {
    let mut memo: HashMap<Id, (u32, ExtractedTerm)> = HashMap::new();
    extract_rec(egraph, egraph.find(root), &mut memo).1
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractedTerm {
    Const(i64),
    Opaque(Value),
    Cmp(CmpKind, Box<ExtractedTerm>, Box<ExtractedTerm>),
    Op(Opcode, Vec<ExtractedTerm>),
}

fn extract_rec(egraph: &EGraph, id: Id, memo: &mut HashMap<Id, (u32, ExtractedTerm)>) -> (u32, ExtractedTerm) {
    if let Some(cached) = memo.get(&id) {
        return cached.clone();
    }
    // Break cycles (a class reachable from itself through a rewrite) by
    // seeding a provisional high-cost entry before recursing.
    memo.insert(id, (u32::MAX, ExtractedTerm::Const(0)));

    let mut best: Option<(u32, ExtractedTerm)> = None;
    for node in egraph.nodes(id) {
        let candidate = match node {
            ENode::Const(v) => Some((0, ExtractedTerm::Const(*v))),
            ENode::Opaque(v) => Some((0, ExtractedTerm::Opaque(*v))),
            ENode::Cmp(kind, a, b) => {
                let (ca, ta) = extract_rec(egraph, egraph.find(*a), memo);
                let (cb, tb) = extract_rec(egraph, egraph.find(*b), memo);
                (ca != u32::MAX && cb != u32::MAX)
                    .then(|| (ca.saturating_add(cb).saturating_add(1), ExtractedTerm::Cmp(*kind, Box::new(ta), Box::new(tb))))
            }
            ENode::Op(op, children) => {
                let mut cost = 1u32;
                let mut terms = Vec::with_capacity(children.len());
                let mut skip = false;
                for &c in children.iter() {
                    let (child_cost, child_term) = extract_rec(egraph, egraph.find(c), memo);
                    if child_cost == u32::MAX {
                        skip = true;
                        break;
                    }
                    cost = cost.saturating_add(child_cost);
                    terms.push(child_term);
                }
                (!skip).then_some((cost, ExtractedTerm::Op(*op, terms)))
            }
        };
        let Some((cost, term)) = candidate else { continue };
        let better = match &best {
            None => true,
            Some((best_cost, _)) => cost < *best_cost,
        };
        if better {
            best = Some((cost, term));
        }
    }

    let result = best.unwrap_or((u32::MAX, ExtractedTerm::Const(0)));
    memo.insert(id, result.clone());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::function::{CallConv, Function, Signature};
    use crate::ir::types::Type;

    #[test]
    fn hash_cons_uniqueness() {
        let mut g = EGraph::new();
        let a = g.add_const(1);
        let b = g.add_const(1);
        assert_eq!(a, b);
        let c = g.add_const(2);
        assert_ne!(a, c);
    }

    #[test]
    fn congruence_after_merge_and_rebuild() {
        // x, y, 1, x+1, y+1; merge(x, y); rebuild; find(x+1) == find(y+1).
        let mut g = EGraph::new();
        let x = g.add_opaque(Value::from_u32(0));
        let y = g.add_opaque(Value::from_u32(1));
        let one = g.add_const(1);
        let x_plus_1 = g.add_op(Opcode::Iadd, &[x, one]);
        let y_plus_1 = g.add_op(Opcode::Iadd, &[y, one]);
        assert_ne!(g.find(x_plus_1), g.find(y_plus_1));

        g.merge(x, y);
        g.rebuild();
        assert_eq!(g.find(x_plus_1), g.find(y_plus_1));
    }

    #[test]
    fn saturation_rewrites_add_zero_to_its_operand() {
        // add(iadd, [a, const0]); one saturation iteration with
        // "iadd_zero_right" finds(result) == find(a).
        let mut g = EGraph::new();
        let a = g.add_opaque(Value::from_u32(0));
        let zero = g.add_const(0);
        let sum = g.add_op(Opcode::Iadd, &[a, zero]);

        let rules: Vec<GuardedRule> = built_in_rules().into_iter().filter(|r| r.rule.name == "iadd_zero_right").collect();
        saturate(&mut g, &rules, SaturationConfig { max_iterations: 1, ..Default::default() });

        assert_eq!(g.find(sum), g.find(a));
    }

    #[test]
    fn self_comparison_rules_fold_to_a_boolean_constant() {
        let mut g = EGraph::new();
        let x = g.add_opaque(Value::from_u32(0));
        let eq = g.add_cmp(CmpKind::Int(IntCC::Equal), x, x);
        let ne = g.add_cmp(CmpKind::Int(IntCC::NotEqual), x, x);
        saturate(&mut g, &built_in_rules(), SaturationConfig::default());
        assert!(g.is_constant_one(eq));
        assert!(g.is_constant_zero(ne));
    }

    #[test]
    fn extractor_prefers_the_collapsed_form() {
        let mut g = EGraph::new();
        let a = g.add_opaque(Value::from_u32(0));
        let zero = g.add_const(0);
        let sum = g.add_op(Opcode::Iadd, &[a, zero]);
        saturate(&mut g, &built_in_rules(), SaturationConfig::default());
        assert_eq!(extract(&g, sum), ExtractedTerm::Opaque(Value::from_u32(0)));
    }

    #[test]
    fn builder_maps_a_simple_function_into_equivalent_e_classes() {
        let mut func = Function::with_name_str("f", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let p0 = b.append_block_param(entry, Type::I32);
        b.switch_to_block(entry).unwrap();
        let zero = b.ins().iconst(Type::I32, 0).unwrap();
        let sum = b.ins().iadd(Type::I32, p0, zero).unwrap();
        b.ins().return_(&[sum]).unwrap();

        let (egraph, map) = build_from_function(&func);
        let sum_id = map[&sum];
        assert!(egraph.nodes(sum_id).iter().any(|n| matches!(n, ENode::Op(Opcode::Iadd, _))));
        let _ = FloatCC::Equal;
    }
}
