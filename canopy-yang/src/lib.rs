//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod modstate;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;

use crate::types::TypeSpec;

/// Index of a module within a [`YangSpec`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ModuleId(pub u32);

/// Index of a schema statement within a [`YangSpec`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SnodeId(pub u32);

/// Index of an identity within a [`YangSpec`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IdentityId(pub u32);

/// A compiled YANG schema.
///
/// This is the output of the (external) YANG parser: modules with their
/// revisions and features, the identity graph, and the tree of data
/// statements with their types and constraints. The engine treats it as
/// immutable after initialization; an `Arc<YangSpec>` is passed explicitly
/// to every entry point that needs it.
#[derive(Debug, Default)]
pub struct YangSpec {
    modules: Vec<Module>,
    identities: Vec<Identity>,
    stmts: Vec<Statement>,
    roots: Vec<SnodeId>,
    identity_index: HashMap<String, IdentityId>,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub namespace: String,
    pub revision: String,
    pub features: Vec<String>,
}

#[derive(Debug)]
pub struct Identity {
    pub name: String,
    pub module: ModuleId,
    pub bases: Vec<IdentityId>,
}

/// A data statement: container, list, leaf or leaf-list.
#[derive(Debug)]
pub struct Statement {
    pub name: String,
    pub module: ModuleId,
    pub parent: Option<SnodeId>,
    pub children: Vec<SnodeId>,
    pub kind: StatementKind,
    pub when: Option<String>,
    pub musts: Vec<Must>,
}

#[derive(Debug, EnumAsInner)]
pub enum StatementKind {
    Container {
        presence: bool,
    },
    List {
        keys: Vec<String>,
        min_elements: Option<u32>,
        max_elements: Option<u32>,
        unique: Vec<Vec<String>>,
        user_ordered: bool,
    },
    Leaf {
        typ: TypeSpec,
        mandatory: bool,
        default: Option<String>,
    },
    LeafList {
        typ: TypeSpec,
        min_elements: Option<u32>,
        max_elements: Option<u32>,
        user_ordered: bool,
    },
}

/// A `must` constraint attached to a statement.
#[derive(Debug)]
pub struct Must {
    pub expr: String,
    pub error_message: Option<String>,
    pub error_app_tag: Option<String>,
}

/// Incremental constructor for a [`YangSpec`], the seam where the
/// out-of-scope YANG parser hands over its output.
#[derive(Debug, Default)]
pub struct SpecBuilder {
    spec: YangSpec,
}

// ===== impl YangSpec =====

impl YangSpec {
    pub fn stmt(&self, id: SnodeId) -> &Statement {
        &self.stmts[id.0 as usize]
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(index, module)| (ModuleId(index as u32), module))
    }

    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|module| module.name == name)
            .map(|index| ModuleId(index as u32))
    }

    pub fn module_by_namespace(&self, namespace: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|module| module.namespace == namespace)
            .map(|index| ModuleId(index as u32))
    }

    pub fn has_feature(&self, module: ModuleId, feature: &str) -> bool {
        self.module(module).features.iter().any(|f| f == feature)
    }

    pub fn roots(&self) -> &[SnodeId] {
        &self.roots
    }

    /// Looks up a child statement by name. With no parent, top-level
    /// statements are searched. An optional module name disambiguates
    /// top-level statements sharing a name across modules.
    pub fn find_child(
        &self,
        parent: Option<SnodeId>,
        module: Option<&str>,
        name: &str,
    ) -> Option<SnodeId> {
        let candidates: &[SnodeId] = match parent {
            Some(parent) => &self.stmt(parent).children,
            None => &self.roots,
        };
        candidates
            .iter()
            .copied()
            .find(|&id| {
                let stmt = self.stmt(id);
                stmt.name == name
                    && module
                        .is_none_or(|m| self.module(stmt.module).name == m)
            })
    }

    /// Schema path of a statement, e.g. `/sys:system/login/user`.
    pub fn schema_path(&self, id: SnodeId) -> String {
        let mut segments = vec![];
        let mut cursor = Some(id);
        while let Some(id) = cursor {
            let stmt = self.stmt(id);
            if stmt.parent.is_none() {
                let module = self.module(stmt.module);
                segments.push(format!("{}:{}", module.name, stmt.name));
            } else {
                segments.push(stmt.name.clone());
            }
            cursor = stmt.parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    pub fn identity(&self, id: IdentityId) -> &Identity {
        &self.identities[id.0 as usize]
    }

    pub fn identity_by_name(&self, name: &str) -> Option<IdentityId> {
        // Accept both qualified ("module:name") and bare names.
        let bare = name.split_once(':').map_or(name, |(_, name)| name);
        self.identity_index.get(bare).copied()
    }

    /// Whether `name` is (transitively) derived from the `base` identity.
    /// An identity is considered derived from itself.
    pub fn identity_derived_from(&self, name: &str, base: &str) -> bool {
        let Some(id) = self.identity_by_name(name) else {
            return false;
        };
        let Some(base_id) = self.identity_by_name(base) else {
            return false;
        };
        self.identity_derived_from_id(id, base_id)
    }

    fn identity_derived_from_id(
        &self,
        id: IdentityId,
        base: IdentityId,
    ) -> bool {
        if id == base {
            return true;
        }
        self.identity(id)
            .bases
            .iter()
            .any(|&parent| self.identity_derived_from_id(parent, base))
    }
}

// ===== impl Statement =====

impl Statement {
    pub fn is_list(&self) -> bool {
        matches!(self.kind, StatementKind::List { .. })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, StatementKind::Leaf { .. })
    }

    pub fn is_leaf_list(&self) -> bool {
        matches!(self.kind, StatementKind::LeafList { .. })
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, StatementKind::Container { .. })
    }

    /// Key leaf names, in key order. Empty for non-lists.
    pub fn keys(&self) -> &[String] {
        match &self.kind {
            StatementKind::List { keys, .. } => keys,
            _ => &[],
        }
    }

    pub fn leaf_type(&self) -> Option<&TypeSpec> {
        match &self.kind {
            StatementKind::Leaf { typ, .. }
            | StatementKind::LeafList { typ, .. } => Some(typ),
            _ => None,
        }
    }
}

// ===== impl SpecBuilder =====

impl SpecBuilder {
    pub fn new() -> SpecBuilder {
        SpecBuilder::default()
    }

    pub fn add_module(
        &mut self,
        name: &str,
        namespace: &str,
        revision: &str,
    ) -> ModuleId {
        let id = ModuleId(self.spec.modules.len() as u32);
        self.spec.modules.push(Module {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            revision: revision.to_owned(),
            features: vec![],
        });
        id
    }

    pub fn add_feature(&mut self, module: ModuleId, feature: &str) {
        self.spec.modules[module.0 as usize]
            .features
            .push(feature.to_owned());
    }

    pub fn add_identity(
        &mut self,
        module: ModuleId,
        name: &str,
        bases: &[&str],
    ) -> IdentityId {
        let bases = bases
            .iter()
            .map(|base| {
                self.spec
                    .identity_by_name(base)
                    .expect("base identity must be declared first")
            })
            .collect();
        let id = IdentityId(self.spec.identities.len() as u32);
        self.spec.identities.push(Identity {
            name: name.to_owned(),
            module,
            bases,
        });
        self.spec.identity_index.insert(name.to_owned(), id);
        id
    }

    pub fn container(
        &mut self,
        module: ModuleId,
        parent: Option<SnodeId>,
        name: &str,
    ) -> SnodeId {
        self.add_stmt(
            module,
            parent,
            name,
            StatementKind::Container { presence: false },
        )
    }

    pub fn presence_container(
        &mut self,
        module: ModuleId,
        parent: Option<SnodeId>,
        name: &str,
    ) -> SnodeId {
        self.add_stmt(
            module,
            parent,
            name,
            StatementKind::Container { presence: true },
        )
    }

    pub fn list(
        &mut self,
        module: ModuleId,
        parent: Option<SnodeId>,
        name: &str,
        keys: &[&str],
    ) -> SnodeId {
        self.add_stmt(
            module,
            parent,
            name,
            StatementKind::List {
                keys: keys.iter().map(|key| (*key).to_owned()).collect(),
                min_elements: None,
                max_elements: None,
                unique: vec![],
                user_ordered: false,
            },
        )
    }

    pub fn leaf(
        &mut self,
        module: ModuleId,
        parent: Option<SnodeId>,
        name: &str,
        typ: TypeSpec,
    ) -> SnodeId {
        self.add_stmt(
            module,
            parent,
            name,
            StatementKind::Leaf {
                typ,
                mandatory: false,
                default: None,
            },
        )
    }

    pub fn leaf_list(
        &mut self,
        module: ModuleId,
        parent: Option<SnodeId>,
        name: &str,
        typ: TypeSpec,
    ) -> SnodeId {
        self.add_stmt(
            module,
            parent,
            name,
            StatementKind::LeafList {
                typ,
                min_elements: None,
                max_elements: None,
                user_ordered: false,
            },
        )
    }

    pub fn mandatory(&mut self, id: SnodeId) {
        if let StatementKind::Leaf { mandatory, .. } = &mut self.stmt_mut(id).kind
        {
            *mandatory = true;
        }
    }

    pub fn default_value(&mut self, id: SnodeId, value: &str) {
        if let StatementKind::Leaf { default, .. } = &mut self.stmt_mut(id).kind
        {
            *default = Some(value.to_owned());
        }
    }

    pub fn min_elements(&mut self, id: SnodeId, min: u32) {
        match &mut self.stmt_mut(id).kind {
            StatementKind::List { min_elements, .. }
            | StatementKind::LeafList { min_elements, .. } => {
                *min_elements = Some(min);
            }
            _ => {}
        }
    }

    pub fn max_elements(&mut self, id: SnodeId, max: u32) {
        match &mut self.stmt_mut(id).kind {
            StatementKind::List { max_elements, .. }
            | StatementKind::LeafList { max_elements, .. } => {
                *max_elements = Some(max);
            }
            _ => {}
        }
    }

    pub fn unique(&mut self, id: SnodeId, leaves: &[&str]) {
        if let StatementKind::List { unique, .. } = &mut self.stmt_mut(id).kind
        {
            unique
                .push(leaves.iter().map(|leaf| (*leaf).to_owned()).collect());
        }
    }

    pub fn user_ordered(&mut self, id: SnodeId) {
        match &mut self.stmt_mut(id).kind {
            StatementKind::List { user_ordered, .. }
            | StatementKind::LeafList { user_ordered, .. } => {
                *user_ordered = true;
            }
            _ => {}
        }
    }

    pub fn when(&mut self, id: SnodeId, expr: &str) {
        self.stmt_mut(id).when = Some(expr.to_owned());
    }

    pub fn must(&mut self, id: SnodeId, expr: &str) {
        self.stmt_mut(id).musts.push(Must {
            expr: expr.to_owned(),
            error_message: None,
            error_app_tag: None,
        });
    }

    pub fn must_with_error(
        &mut self,
        id: SnodeId,
        expr: &str,
        error_message: &str,
        error_app_tag: Option<&str>,
    ) {
        self.stmt_mut(id).musts.push(Must {
            expr: expr.to_owned(),
            error_message: Some(error_message.to_owned()),
            error_app_tag: error_app_tag.map(str::to_owned),
        });
    }

    pub fn build(self) -> Arc<YangSpec> {
        Arc::new(self.spec)
    }

    fn add_stmt(
        &mut self,
        module: ModuleId,
        parent: Option<SnodeId>,
        name: &str,
        kind: StatementKind,
    ) -> SnodeId {
        let id = SnodeId(self.spec.stmts.len() as u32);
        self.spec.stmts.push(Statement {
            name: name.to_owned(),
            module,
            parent,
            children: vec![],
            kind,
            when: None,
            musts: vec![],
        });
        match parent {
            Some(parent) => {
                self.spec.stmts[parent.0 as usize].children.push(id)
            }
            None => self.spec.roots.push(id),
        }
        id
    }

    fn stmt_mut(&mut self, id: SnodeId) -> &mut Statement {
        &mut self.spec.stmts[id.0 as usize]
    }
}
