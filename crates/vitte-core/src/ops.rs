//! ops.rs — jeu d'instructions de la VM Vitte.
//!
//! Codage mono-octet par opcode, opérandes immédiats ensuite en flux plat
//! (spec §6 : "Instructions are variable-length (1, 2, 3 bytes, plus the
//! `CLOSURE` tail)"). L'ordre des variantes n'a ici aucune contrainte de
//! compatibilité binaire (rien n'est persisté, spec §6) ; ajouter une
//! variante n'importe où est sans risque.

/// Jeu d'instructions complet (spec §4.6, table des opcodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Constant,
    Nil,
    True,
    False,
    Pop,
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    GetUpvalue,
    SetUpvalue,
    GetProperty,
    SetProperty,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Jump,
    JumpIfFalse,
    Loop,
    Call,
    Closure,
    CloseUpvalue,
    Return,
    Class,
    Method,
}

impl OpCode {
    pub const COUNT: u8 = Self::Method as u8 + 1;

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::GetProperty => "OP_GET_PROPERTY",
            OpCode::SetProperty => "OP_SET_PROPERTY",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
            OpCode::Class => "OP_CLASS",
            OpCode::Method => "OP_METHOD",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if byte < Self::COUNT {
            // SAFETY-free: repr(u8) + contiguous discriminants, validated by range check above.
            const TABLE: [OpCode; OpCode::COUNT as usize] = [
                OpCode::Constant,
                OpCode::Nil,
                OpCode::True,
                OpCode::False,
                OpCode::Pop,
                OpCode::GetLocal,
                OpCode::SetLocal,
                OpCode::GetGlobal,
                OpCode::DefineGlobal,
                OpCode::SetGlobal,
                OpCode::GetUpvalue,
                OpCode::SetUpvalue,
                OpCode::GetProperty,
                OpCode::SetProperty,
                OpCode::Equal,
                OpCode::Greater,
                OpCode::Less,
                OpCode::Add,
                OpCode::Subtract,
                OpCode::Multiply,
                OpCode::Divide,
                OpCode::Not,
                OpCode::Negate,
                OpCode::Print,
                OpCode::Jump,
                OpCode::JumpIfFalse,
                OpCode::Loop,
                OpCode::Call,
                OpCode::Closure,
                OpCode::CloseUpvalue,
                OpCode::Return,
                OpCode::Class,
                OpCode::Method,
            ];
            Ok(TABLE[byte as usize])
        } else {
            Err(byte)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_opcode_byte() {
        for b in 0..OpCode::COUNT {
            let op = OpCode::try_from(b).unwrap();
            assert_eq!(op as u8, b);
        }
        assert!(OpCode::try_from(OpCode::COUNT).is_err());
    }
}
