//! Whole programs: functions, foreign declarations, global constants.

use std::collections::BTreeMap;

use weft_ir::{DefKind, Literal, Name, Storage, Type, Var};

use super::Function;
use crate::instr::CallProps;

/// Prefix of every generated global-constant name.
pub const GLOBAL_CONST_PREFIX: &str = "__c:";

const FLOAT_SUFFIX_LEN: usize = 5;
const STRING_SUFFIX_LEN: usize = 10;

/// Signature of a function implemented outside the intermediate code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignFunction {
    pub name: Name,
    pub inputs: Vec<Type>,
    pub outputs: Vec<Type>,
    pub props: CallProps,
}

/// A complete program.
///
/// Global constants are de-duplicated by value: adding the same literal
/// twice yields the same variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub foreign: Vec<ForeignFunction>,
    globals: BTreeMap<Name, Literal>,
    by_value: BTreeMap<Literal, Var>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions.push(func);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name.as_str() == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name.as_str() == name)
    }

    pub fn add_foreign(&mut self, foreign: ForeignFunction) {
        self.foreign.push(foreign);
    }

    /// The global constant holding `value`, created if absent.
    pub fn add_global_const(&mut self, value: Literal) -> Var {
        if let Some(var) = self.by_value.get(&value) {
            return var.clone();
        }
        let base = Name::new(format!("{GLOBAL_CONST_PREFIX}{}", const_suffix(&value)));
        let name = if self.globals.contains_key(&base) {
            (1u32..)
                .map(|n| base.with_suffix(format_args!("-{n}")))
                .find(|n| !self.globals.contains_key(n))
                .unwrap_or(base)
        } else {
            base
        };
        let var = Var::new(
            name.clone(),
            Type::Future(value.prim()),
            Storage::GlobalConst,
            DefKind::GlobalConst,
        );
        self.globals.insert(name, value.clone());
        self.by_value.insert(value, var.clone());
        var
    }

    pub fn lookup_global_const(&self, value: &Literal) -> Option<&Var> {
        self.by_value.get(value)
    }

    /// Value of a global constant by name.
    pub fn global_const_value(&self, name: &Name) -> Option<&Literal> {
        self.globals.get(name)
    }

    /// Global constants in name order.
    pub fn global_consts(&self) -> impl Iterator<Item = (&Name, &Literal)> {
        self.globals.iter()
    }

    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(Function::instruction_count).sum()
    }
}

fn const_suffix(value: &Literal) -> String {
    let tag = value.prim().tag();
    let body: String = match value {
        Literal::Bool(b) => b.to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(_) => value.to_string().chars().take(FLOAT_SUFFIX_LEN).collect(),
        Literal::Str(s) => s
            .as_str()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(STRING_SUFFIX_LEN)
            .collect(),
    };
    format!("{tag}_{body}")
}
