//! Displaying IR.

use super::{FunctionBody, Module, ValueDef};

use std::fmt::{Display, Formatter, Result as FmtResult};

pub struct FunctionBodyDisplay<'a>(
    pub(crate) &'a FunctionBody,
    pub(crate) &'a str,
    pub(crate) Option<&'a Module>,
);

impl<'a> FunctionBodyDisplay<'a> {
    fn ty_name(&self, ty: super::Type) -> String {
        match self.2 {
            Some(module) => module.type_data(ty).name().to_owned(),
            None => format!("{}", ty),
        }
    }
}

impl<'a> Display for FunctionBodyDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        writeln!(f, "{}function {{", self.1)?;

        for (block_id, block) in self.0.blocks.entries() {
            let block_params = block
                .params
                .iter()
                .map(|&(ty, val)| format!("{}: {}", val, self.ty_name(ty)))
                .collect::<Vec<_>>();
            writeln!(f, "{}  {}({}):", self.1, block_id, block_params.join(", "))?;
            for &pred in &block.preds {
                writeln!(f, "{}    # pred: {}", self.1, pred)?;
            }
            for &succ in &block.succs {
                writeln!(f, "{}    # succ: {}", self.1, succ)?;
            }
            for &inst in &block.insts {
                match &self.0.values[inst] {
                    ValueDef::Operator(op, args, tys) => {
                        let args = args.iter().map(|&v| format!("{}", v)).collect::<Vec<_>>();
                        let tys = tys.iter().map(|&ty| self.ty_name(ty)).collect::<Vec<_>>();
                        writeln!(
                            f,
                            "{}    {} = {} {} # {}",
                            self.1,
                            inst,
                            op,
                            args.join(", "),
                            tys.join(", ")
                        )?;
                    }
                    _ => unreachable!(),
                }
            }
            writeln!(f, "{}    {}", self.1, block.terminator)?;
        }

        writeln!(f, "{}}}", self.1)?;

        Ok(())
    }
}
