use super::{Block, Element, FunctionBodyDisplay, Type, Var};
use crate::entity::EntityVec;
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockDef {
    /// Program elements, in execution order.
    pub elements: Vec<Element>,
    /// Predecessor blocks.
    pub preds: SmallVec<[Block; 4]>,
    /// Successor blocks.
    pub succs: SmallVec<[Block; 4]>,
    /// Label used by the text format, if the block was parsed or named.
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionBody {
    pub name: String,
    /// Variable declarations, indexed by `Var`.
    pub vars: EntityVec<Var, VarDecl>,
    /// Entry block.
    pub entry: Block,
    /// Block bodies.
    pub blocks: EntityVec<Block, BlockDef>,
}

impl FunctionBody {
    /// Creates a body with a single, empty entry block.
    pub fn new(name: &str) -> FunctionBody {
        let mut blocks = EntityVec::default();
        let entry = blocks.push(BlockDef::default());
        FunctionBody {
            name: name.to_owned(),
            vars: EntityVec::default(),
            entry,
            blocks,
        }
    }

    pub fn add_var(&mut self, name: &str, ty: Type) -> Var {
        let var = self.vars.push(VarDecl {
            name: name.to_owned(),
            ty,
        });
        log::trace!("add_var: {} is {}", name, var);
        var
    }

    pub fn add_block(&mut self) -> Block {
        let id = self.blocks.push(BlockDef::default());
        log::trace!("add_block: block {}", id);
        id
    }

    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
        log::trace!("add_edge: from {} to {}", from, to);
    }

    pub fn push_element(&mut self, block: Block, element: Element) {
        self.blocks[block].elements.push(element);
    }

    pub fn var_named(&self, name: &str) -> Option<Var> {
        self.vars
            .entries()
            .find(|(_, decl)| decl.name == name)
            .map(|(var, _)| var)
    }

    pub fn var_name(&self, var: Var) -> String {
        match self.vars.get(var) {
            Some(decl) => decl.name.clone(),
            None => format!("{}", var),
        }
    }

    pub fn block_label(&self, block: Block) -> String {
        match self.blocks.get(block).and_then(|def| def.label.as_ref()) {
            Some(label) => label.clone(),
            None => format!("{}", block),
        }
    }

    pub fn display<'a>(&'a self, indent: &'a str) -> FunctionBodyDisplay<'a> {
        FunctionBodyDisplay(self, indent)
    }
}
