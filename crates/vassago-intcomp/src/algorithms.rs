//! Built-in base algorithms.
//!
//! `wasm0xd` is the default parse algorithm: it defines no section
//! symbols, so every section body is treated as opaque and enters the
//! integer pipeline one byte per value. `cism0x0` is the base algorithm
//! the CISM codegen branch encloses and overrides; it carries the
//! `opcode`/`categorize`/`process` surface those overrides replace.

use vassago_core::{Result, ValueFormat};
use vassago_filt::{IntLit, NodeKind, SymbolTable};

/// Default parse algorithm for WASM-style input (no known sections).
pub fn wasm0xd() -> Result<SymbolTable> {
    let mut table = SymbolTable::new();
    let algorithm = table.create(NodeKind::Algorithm, []);
    table.set_algorithm(algorithm);
    table.install()?;
    Ok(table)
}

/// Base algorithm of the CISM intermediate form.
pub fn cism0x0() -> Result<SymbolTable> {
    let mut table = SymbolTable::new();

    // opcode() reads the next raw value.
    let opcode_sym = table.get_or_create_symbol("opcode");
    let opcode_sym_node = table.symbol_node(opcode_sym);
    let opcode_params = table.leaf(NodeKind::ParamValues(IntLit::default_value(0)));
    let raw = table.leaf(NodeKind::Varuint64NoArgs);
    let opcode_body = table.create(NodeKind::Read, [raw]);
    let opcode_define = table.create(
        NodeKind::Define,
        [opcode_sym_node, opcode_params, opcode_body],
    );

    // categorize(v) passes unmapped values through.
    let cat_sym = table.get_or_create_symbol("categorize");
    let cat_sym_node = table.symbol_node(cat_sym);
    let cat_params = table.leaf(NodeKind::ParamValues(IntLit::new(1, ValueFormat::Decimal)));
    let param = table.leaf(NodeKind::Param {
        index: IntLit::new(0, ValueFormat::Decimal),
        defining: None,
    });
    let cat_body = table.create(NodeKind::Map, [param]);
    let cat_define = table.create(NodeKind::Define, [cat_sym_node, cat_params, cat_body]);

    // process() categorizes the next opcode.
    let proc_sym = table.get_or_create_symbol("process");
    let proc_sym_node = table.symbol_node(proc_sym);
    let proc_params = table.leaf(NodeKind::ParamValues(IntLit::default_value(0)));
    let opcode_ref = table.symbol_node(opcode_sym);
    let opcode_call = table.create(NodeKind::Eval, [opcode_ref]);
    let cat_ref = table.symbol_node(cat_sym);
    let proc_body = table.create(NodeKind::Eval, [cat_ref, opcode_call]);
    let proc_define = table.create(NodeKind::Define, [proc_sym_node, proc_params, proc_body]);

    let algorithm = table.create(
        NodeKind::Algorithm,
        [opcode_define, cat_define, proc_define],
    );
    table.set_algorithm(algorithm);
    table.install()?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasm0xd_has_no_section_definitions() {
        let table = wasm0xd().unwrap();
        assert!(table.is_installed());
        assert!(table.definition_by_name("code").is_none());
    }

    #[test]
    fn test_cism0x0_defines_base_surface() {
        let table = cism0x0().unwrap();
        for name in ["opcode", "categorize", "process"] {
            assert!(
                table.definition_by_name(name).is_some(),
                "cism base must define {name}"
            );
        }
    }
}
