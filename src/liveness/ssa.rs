//! Live ranges with a single dominating definition.

use super::boundary::{find_boundary_in_non_def_block, find_boundary_in_ssa_def_block, Boundary};
use super::range::{DefSet, FieldLiveRange};
use super::tracker::FieldLiveness;
use crate::cfg::CFGInfo;
use crate::entity::EntityRef;
use crate::ir::{Block, FunctionBody, Module, Type, Value};
use crate::leaf::{leaf_count, LeafRange};
use crate::options::LivenessOptions;

/// The single definition of an SSA live range: the defining
/// instruction (or block parameter) and the leaves it defines.
#[derive(Clone, Debug, Default)]
pub struct SsaDef {
    def: Option<(Value, Block, LeafRange)>,
    cfg: Option<CFGInfo>,
}

impl SsaDef {
    /// The defining instruction or block parameter.
    pub fn def(&self) -> Option<Value> {
        self.def.map(|(def, _, _)| def)
    }

    pub fn range(&self) -> Option<LeafRange> {
        self.def.map(|(_, _, range)| range)
    }
}

impl DefSet for SsaDef {
    fn is_initialized(&self) -> bool {
        self.def.is_some()
    }

    fn reset(&mut self) {
        self.def = None;
    }

    fn is_def(&self, def: Value, bit: usize) -> bool {
        matches!(self.def, Some((d, _, range)) if d == def && range.contains(bit))
    }

    fn is_def_block(&self, block: Block, bit: usize) -> bool {
        matches!(self.def, Some((_, b, range)) if b == block && range.contains(bit))
    }

    fn is_user_before_def(&self, _body: &FunctionBody, _user: Value, _bit: usize) -> bool {
        false
    }

    fn check_user(&self, body: &FunctionBody, user: Value) {
        if let (Some(cfg), Some((def, def_block, _))) = (&self.cfg, self.def) {
            let use_block = body.value_blocks[user];
            assert!(
                !cfg.is_reachable(use_block) || cfg.dominates(def_block, use_block),
                "internal error: use {} in {} is not dominated by def {} in {}",
                user,
                use_block,
                def,
                def_block
            );
        }
    }

    fn find_boundaries_in_block(
        &self,
        body: &FunctionBody,
        liveness: &FieldLiveness,
        block: Block,
        bit: usize,
        is_live_out: bool,
        boundary: &mut Boundary,
    ) {
        // A live-out block cannot hold the end of a dominated range.
        if is_live_out {
            return;
        }
        if !self.is_def_block(block, bit) {
            find_boundary_in_non_def_block(body, block, bit, boundary, liveness);
            return;
        }
        if let Some((def, _, range)) = self.def {
            debug_assert!(range.contains(bit));
            find_boundary_in_ssa_def_block(body, def, bit, boundary, liveness);
        }
    }
}

pub type SsaLiveRange<'a> = FieldLiveRange<'a, SsaDef>;

impl<'a> FieldLiveRange<'a, SsaDef> {
    /// A live range for a root value of type `ty`.
    pub fn new(
        module: &Module,
        body: &'a FunctionBody,
        ty: Type,
        options: LivenessOptions,
    ) -> SsaLiveRange<'a> {
        let cfg = if options.verify_ssa_dominance {
            Some(CFGInfo::new(body))
        } else {
            None
        };
        let defs = SsaDef { def: None, cfg };
        FieldLiveRange::with_defs(body, leaf_count(module, ty), options, defs)
    }

    /// Set the definition of `range`. Results of multi-result
    /// instructions are defined by the instruction itself.
    pub fn initialize_def(&mut self, value: Value, range: LeafRange) {
        assert!(
            self.defs.def.is_none(),
            "internal error: SSA live range defined twice"
        );
        assert!(range.end <= self.num_bits());
        let def = self.body.defining_inst(value).unwrap_or(value);
        let block = self.body.value_blocks[def];
        assert!(
            block.is_valid(),
            "internal error: def {} is not placed in a block",
            def
        );
        log::trace!("ssa live range: def {} in {} over {}", def, block, range);
        self.defs.def = Some((def, block, range));
        self.liveness.initialize_def_block(block, range);
    }
}
