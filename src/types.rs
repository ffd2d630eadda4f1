//! The Type context: the narrow, consumed collaborator described in
//! DATA MODEL / EXTERNAL INTERFACES. Primitive, pointer, view, array,
//! structure, and function types are created through [`TypeContext`] and
//! referenced everywhere else in the crate only by [`TypeId`] — the same
//! "intern once, reference by handle" shape the construction core itself
//! uses for values (C1), mirrored here at the type level.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// The closed set of scalar value types, per DATA MODEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicValueType {
    None,
    Int1,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    Float32,
    Float64,
}

impl BasicValueType {
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int1 | Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Bit width used for shift-amount computation and sign-extension.
    pub fn bit_width(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Int1 => 1,
            Self::Int8 => 8,
            Self::Int16 => 16,
            Self::Int32 | Self::Float32 => 32,
            Self::Int64 | Self::Float64 => 64,
            Self::Float16 => 16,
        }
    }
}

impl fmt::Display for BasicValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Int1 => "i1",
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::Int32 => "i32",
            Self::Int64 => "i64",
            Self::Float16 => "f16",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        };
        write!(f, "{s}")
    }
}

/// GPU-style address spaces for pointer/view types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Generic,
    Global,
    Shared,
    Local,
    Constant,
}

/// A handle into a [`TypeContext`]'s arena. Stable for the lifetime of the
/// context; never reused, so two `TypeId`s are equal iff they name the
/// same structural type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) enum TypeData {
    Primitive(BasicValueType),
    Pointer { pointee: TypeId, addr_space: AddressSpace },
    View { pointee: TypeId, addr_space: AddressSpace },
    Array { element: TypeId, dims: Vec<u32> },
    Struct { name: String, fields: Vec<TypeId> },
    Function { params: Vec<TypeId>, ret: TypeId },
}

/// A resolved, owned view of a type, returned by [`TypeContext::resolve`]
/// for display and introspection; `TypeId` remains the currency used
/// everywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Primitive(BasicValueType),
    Pointer { pointee: TypeId, addr_space: AddressSpace },
    View { pointee: TypeId, addr_space: AddressSpace },
    Array { element: TypeId, dims: Vec<u32> },
    Struct { name: String, fields: Vec<TypeId> },
    Function { params: Vec<TypeId>, ret: TypeId },
}

struct Inner {
    arena: Vec<TypeData>,
    interned: HashMap<TypeData, TypeId>,
}

/// Content-addressed, thread-safe type interner. Shared by reference
/// across every `MethodBuilder` created against the same `IrContext`
/// (§5: the Type context is shared and internally synchronized).
pub struct TypeContext {
    inner: Mutex<Inner>,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { arena: Vec::new(), interned: HashMap::new() }) }
    }

    fn intern(&self, data: TypeData) -> TypeId {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.interned.get(&data) {
            return *id;
        }
        let id = TypeId(inner.arena.len() as u32);
        inner.arena.push(data.clone());
        inner.interned.insert(data, id);
        id
    }

    pub fn get_primitive(&self, bvt: BasicValueType) -> TypeId {
        self.intern(TypeData::Primitive(bvt))
    }

    pub fn create_pointer(&self, pointee: TypeId, addr_space: AddressSpace) -> TypeId {
        self.intern(TypeData::Pointer { pointee, addr_space })
    }

    pub fn create_view(&self, pointee: TypeId, addr_space: AddressSpace) -> TypeId {
        self.intern(TypeData::View { pointee, addr_space })
    }

    /// Arrays are restricted to `dims.len() <= 1` until multi-dimensional
    /// arrays are enabled elsewhere in the core (§4.4.4); the context
    /// itself stores whatever shape it is given; the Construction API is
    /// the place that enforces the `dim < 2` constraint, since the type
    /// context has no notion of "unsupported," only "not yet interned."
    pub fn create_array(&self, element: TypeId, dims: Vec<u32>) -> TypeId {
        self.intern(TypeData::Array { element, dims })
    }

    pub fn create_structure(&self, name: impl Into<String>, fields: Vec<TypeId>) -> TypeId {
        self.intern(TypeData::Struct { name: name.into(), fields })
    }

    pub fn create_function_type(&self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.intern(TypeData::Function { params, ret })
    }

    /// Rebuilds a pointer/view type under a different address space,
    /// keeping the pointee. Used by the Rebuilder (C6) when specializing
    /// a method for a new memory space.
    pub fn specialize_address_space(&self, ty: TypeId, addr_space: AddressSpace) -> TypeId {
        let data = self.resolve_raw(ty);
        match data {
            TypeData::Pointer { pointee, .. } => self.create_pointer(pointee, addr_space),
            TypeData::View { pointee, .. } => self.create_view(pointee, addr_space),
            other => self.intern(other),
        }
    }

    pub fn resolve(&self, id: TypeId) -> Type {
        match self.resolve_raw(id) {
            TypeData::Primitive(bvt) => Type::Primitive(bvt),
            TypeData::Pointer { pointee, addr_space } => Type::Pointer { pointee, addr_space },
            TypeData::View { pointee, addr_space } => Type::View { pointee, addr_space },
            TypeData::Array { element, dims } => Type::Array { element, dims },
            TypeData::Struct { name, fields } => Type::Struct { name, fields },
            TypeData::Function { params, ret } => Type::Function { params, ret },
        }
    }

    fn resolve_raw(&self, id: TypeId) -> TypeData {
        let inner = self.inner.lock().unwrap();
        inner.arena[id.0 as usize].clone()
    }

    pub fn is_primitive(&self, id: TypeId) -> bool {
        matches!(self.resolve(id), Type::Primitive(_))
    }

    pub fn as_basic_value_type(&self, id: TypeId) -> Option<BasicValueType> {
        match self.resolve(id) {
            Type::Primitive(bvt) => Some(bvt),
            _ => None,
        }
    }

    pub fn field_type(&self, struct_ty: TypeId, index: usize) -> Option<TypeId> {
        match self.resolve(struct_ty) {
            Type::Struct { fields, .. } => fields.get(index).copied(),
            _ => None,
        }
    }

    pub fn array_element_type(&self, array_ty: TypeId) -> Option<TypeId> {
        match self.resolve(array_ty) {
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn array_dims(&self, array_ty: TypeId) -> Option<Vec<u32>> {
        match self.resolve(array_ty) {
            Type::Array { dims, .. } => Some(dims),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(bvt) => write!(f, "{bvt}"),
            Type::Pointer { pointee, addr_space } => write!(f, "ptr<{pointee:?}, {addr_space:?}>"),
            Type::View { pointee, addr_space } => write!(f, "view<{pointee:?}, {addr_space:?}>"),
            Type::Array { element, dims } => write!(f, "array<{element:?}, {dims:?}>"),
            Type::Struct { name, .. } => write!(f, "struct {name}"),
            Type::Function { params, ret } => write!(f, "fn({params:?}) -> {ret:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_interned() {
        let ctx = TypeContext::new();
        let a = ctx.get_primitive(BasicValueType::Int32);
        let b = ctx.get_primitive(BasicValueType::Int32);
        assert_eq!(a, b);
        let c = ctx.get_primitive(BasicValueType::Int64);
        assert_ne!(a, c);
    }

    #[test]
    fn pointer_types_are_structurally_interned() {
        let ctx = TypeContext::new();
        let i32_ty = ctx.get_primitive(BasicValueType::Int32);
        let p1 = ctx.create_pointer(i32_ty, AddressSpace::Global);
        let p2 = ctx.create_pointer(i32_ty, AddressSpace::Global);
        let p3 = ctx.create_pointer(i32_ty, AddressSpace::Shared);
        assert_eq!(p1, p2);
        assert_ne!(p1, p3);
    }

    #[test]
    fn struct_field_lookup() {
        let ctx = TypeContext::new();
        let i32_ty = ctx.get_primitive(BasicValueType::Int32);
        let f32_ty = ctx.get_primitive(BasicValueType::Float32);
        let s = ctx.create_structure("Point", vec![i32_ty, f32_ty]);
        assert_eq!(ctx.field_type(s, 0), Some(i32_ty));
        assert_eq!(ctx.field_type(s, 1), Some(f32_ty));
        assert_eq!(ctx.field_type(s, 2), None);
    }

    #[test]
    fn specialize_address_space_keeps_pointee() {
        let ctx = TypeContext::new();
        let i32_ty = ctx.get_primitive(BasicValueType::Int32);
        let global = ctx.create_pointer(i32_ty, AddressSpace::Global);
        let shared = ctx.specialize_address_space(global, AddressSpace::Shared);
        assert_eq!(ctx.resolve(shared), Type::Pointer { pointee: i32_ty, addr_space: AddressSpace::Shared });
    }
}
