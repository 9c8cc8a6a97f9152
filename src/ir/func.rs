use super::{Block, FunctionBodyDisplay, Module, Operator, Terminator, Type, Value, ValueDef};
use crate::entity::{EntityRef, EntityVec, PerEntity};
use anyhow::{bail, Result};

#[derive(Clone, Debug, Default)]
pub struct FunctionBody {
    /// Entry block.
    pub entry: Block,
    /// Block bodies.
    pub blocks: EntityVec<Block, BlockDef>,
    /// Value definitions, indexed by `Value`.
    pub values: EntityVec<Value, ValueDef>,
    /// Blocks in which values are computed. Each may be `Block::invalid()` if not placed.
    pub value_blocks: PerEntity<Value, Block>,
}

impl FunctionBody {
    pub fn new() -> FunctionBody {
        let mut blocks = EntityVec::default();
        let entry = blocks.push(BlockDef::default());
        FunctionBody {
            entry,
            blocks,
            values: EntityVec::default(),
            value_blocks: PerEntity::default(),
        }
    }

    pub fn add_block(&mut self) -> Block {
        let id = self.blocks.push(BlockDef::default());
        log::trace!("add_block: block {}", id);
        id
    }

    fn add_edge(&mut self, from: Block, to: Block) {
        let succ_pos = self.blocks[from].succs.len();
        let pred_pos = self.blocks[to].preds.len();
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
        self.blocks[from].pos_in_succ_pred.push(pred_pos);
        self.blocks[to].pos_in_pred_succ.push(succ_pos);
        log::trace!("add_edge: from {} to {}", from, to);
    }

    pub fn add_value(&mut self, value: ValueDef) -> Value {
        log::trace!("add_value: def {:?}", value);
        let value = self.values.push(value);
        log::trace!(" -> {}", value);
        value
    }

    pub fn add_blockparam(&mut self, block: Block, ty: Type) -> Value {
        let index = self.blocks[block].params.len();
        let value = self.add_value(ValueDef::BlockParam(block, index, ty));
        self.blocks[block].params.push((ty, value));
        self.value_blocks[value] = block;
        value
    }

    pub fn append_to_block(&mut self, block: Block, value: Value) {
        self.blocks[block].insts.push(value);
        self.value_blocks[value] = block;
    }

    /// Append a new instruction to `block` and return it.
    pub fn add_inst(
        &mut self,
        block: Block,
        op: Operator,
        args: Vec<Value>,
        tys: Vec<Type>,
    ) -> Value {
        let inst = self.add_value(ValueDef::Operator(op, args, tys));
        self.append_to_block(block, inst);
        inst
    }

    /// Create the `index`th result of a multi-result instruction.
    pub fn add_pick_output(&mut self, inst: Value, index: usize, ty: Type) -> Value {
        let value = self.add_value(ValueDef::PickOutput(inst, index, ty));
        self.value_blocks[value] = self.value_blocks[inst];
        value
    }

    pub fn set_terminator(&mut self, block: Block, terminator: Terminator) {
        log::trace!("block {} terminator {:?}", block, terminator);
        terminator.visit_successors(|succ| {
            self.add_edge(block, succ);
        });
        self.blocks[block].terminator = terminator;
    }

    pub fn recompute_edges(&mut self) {
        for (_, block) in self.blocks.entries_mut() {
            block.preds.clear();
            block.succs.clear();
            block.pos_in_succ_pred.clear();
            block.pos_in_pred_succ.clear();
        }

        for block in 0..self.blocks.len() {
            let block = Block::new(block);
            let terminator = self.blocks[block].terminator.clone();
            terminator.visit_successors(|succ| {
                self.add_edge(block, succ);
            });
        }
    }

    pub fn value_type(&self, value: Value) -> Option<Type> {
        self.values[value].ty()
    }

    /// The instruction that defines `value`, or `None` for block
    /// parameters.
    pub fn defining_inst(&self, value: Value) -> Option<Value> {
        match &self.values[value] {
            ValueDef::BlockParam(..) => None,
            ValueDef::Operator(..) => Some(value),
            &ValueDef::PickOutput(inst, ..) => Some(inst),
        }
    }

    pub fn is_blockparam(&self, value: Value) -> bool {
        matches!(&self.values[value], ValueDef::BlockParam(..))
    }

    /// Position of `inst` within its block's instruction list.
    pub fn inst_index(&self, inst: Value) -> Option<usize> {
        let block = self.value_blocks[inst];
        if block.is_invalid() {
            return None;
        }
        self.blocks[block].insts.iter().position(|&i| i == inst)
    }

    pub fn validate(&self) -> Result<()> {
        for (block, def) in self.blocks.entries() {
            for &inst in &def.insts {
                if self.value_blocks[inst] != block {
                    bail!(
                        "Inst {} in block {} is recorded as placed in block {}",
                        inst,
                        block,
                        self.value_blocks[inst]
                    );
                }
                if !matches!(&self.values[inst], ValueDef::Operator(..)) {
                    bail!("Value {} in block {} is not an instruction", inst, block);
                }
            }
            for (i, &(_, param)) in def.params.iter().enumerate() {
                if self.values[param] != ValueDef::BlockParam(block, i, def.params[i].0) {
                    bail!("Block param {} of block {} is malformed", param, block);
                }
            }
            for (i, &succ) in def.succs.iter().enumerate() {
                let pos = def.pos_in_succ_pred[i];
                if self.blocks[succ].preds.get(pos) != Some(&block) {
                    bail!("Edge {} -> {} is not mirrored in preds", block, succ);
                }
            }
            let mut bad_target = None;
            def.terminator.visit_targets(|target| {
                if target.args.len() != self.blocks[target.block].params.len() {
                    bad_target = Some(target.block);
                }
            });
            if let Some(target) = bad_target {
                bail!(
                    "Branch from {} to {} has the wrong number of args",
                    block,
                    target
                );
            }
        }
        Ok(())
    }

    pub fn display<'a>(
        &'a self,
        indent: &'a str,
        module: Option<&'a Module>,
    ) -> FunctionBodyDisplay<'a> {
        FunctionBodyDisplay(self, indent, module)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlockDef {
    /// Instructions in this block.
    pub insts: Vec<Value>,
    /// Terminator: branch or return.
    pub terminator: Terminator,
    /// Successor blocks.
    pub succs: Vec<Block>,
    /// For each successor block, our index in its `preds` array.
    pub pos_in_succ_pred: Vec<usize>,
    /// Predecessor blocks.
    pub preds: Vec<Block>,
    /// For each predecessor block, our index in its `succs` array.
    pub pos_in_pred_succ: Vec<usize>,
    /// Type and Value for each blockparam.
    pub params: Vec<(Type, Value)>,
}
