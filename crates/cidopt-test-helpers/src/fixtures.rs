//! Test fixtures - class hierarchies and program descriptions

use cidopt_core::lattice::{ClassId, ClassKind, ClassLattice, MethodDecl};

/// A straight inheritance chain; `names[0]` is the root
pub fn chain(names: &[&str]) -> (ClassLattice, Vec<ClassId>) {
    let mut lattice = ClassLattice::new();
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id = lattice
            .add_class(*name, ClassKind::Class)
            .unwrap_or_else(|e| panic!("{}", e));
        if let Some(&base) = ids.last() {
            lattice.set_base(id, base).unwrap_or_else(|e| panic!("{}", e));
        }
        lattice.set_polymorphic(id, true);
        ids.push(id);
    }
    (lattice, ids)
}

/// A forest described by `(name, base index)` pairs; bases must come first
pub fn forest(classes: &[(&str, Option<usize>)]) -> (ClassLattice, Vec<ClassId>) {
    let mut lattice = ClassLattice::new();
    let mut ids: Vec<ClassId> = Vec::with_capacity(classes.len());
    for (name, base) in classes {
        let id = lattice
            .add_class(*name, ClassKind::Class)
            .unwrap_or_else(|e| panic!("{}", e));
        if let Some(base) = base {
            lattice
                .set_base(id, ids[*base])
                .unwrap_or_else(|e| panic!("{}", e));
        }
        lattice.set_polymorphic(id, true);
        ids.push(id);
    }
    (lattice, ids)
}

/// Declare `method` on `class`, implemented by a fresh function id
pub fn with_method(lattice: &mut ClassLattice, class: ClassId, method: &str, function: u32) {
    lattice.add_method(
        class,
        method,
        MethodDecl {
            function: Some(cidopt_core::bound::FunctionId::from_u32(function)),
            is_final: false,
        },
    );
}

/// `Root1 -> A` and `Root2 -> B`: two independent hierarchies of equal depth
pub fn independent_hierarchies() -> &'static str {
    r#"
classes:
  - name: Root1
    polymorphic: true
  - name: A
    base: Root1
  - name: Root2
    polymorphic: true
  - name: B
    base: Root2
"#
}

/// `var x: Base = new Derived(); x.virtualMethod();`
pub fn single_construction() -> &'static str {
    r#"
classes:
  - name: Base
    methods:
      - name: virtualMethod
        function: Base.virtualMethod
  - name: Derived
    base: Base
    methods:
      - name: virtualMethod
        function: Derived.virtualMethod
functions:
  - name: Base.virtualMethod
    owner: Base
  - name: Derived.virtualMethod
    owner: Derived
  - name: main
    body:
      - kind: let
        name: x
        init:
          kind: convert
          value: { kind: new, class: Derived }
      - kind: expr
        value:
          kind: virtual_call
          receiver: { kind: local, name: x }
          method: virtualMethod
          declaring: Base
units:
  - name: main
    functions: [main, Base.virtualMethod, Derived.virtualMethod]
"#
}

/// `var x: Base = cond ? new Derived1() : new Derived2(); x.virtualMethod();`
pub fn conditional_construction() -> &'static str {
    r#"
classes:
  - name: Base
    kind: abstract
    methods:
      - name: virtualMethod
  - name: Derived1
    base: Base
    methods:
      - name: virtualMethod
        function: Derived1.virtualMethod
  - name: Derived2
    base: Base
    methods:
      - name: virtualMethod
        function: Derived2.virtualMethod
functions:
  - name: Derived1.virtualMethod
    owner: Derived1
  - name: Derived2.virtualMethod
    owner: Derived2
  - name: main
    params: [cond]
    body:
      - kind: let
        name: x
        init:
          kind: conditional
          cond: { kind: local, name: cond }
          then: { kind: new, class: Derived1 }
          else: { kind: new, class: Derived2 }
      - kind: expr
        value:
          kind: virtual_call
          receiver: { kind: local, name: x }
          method: virtualMethod
          declaring: Base
units:
  - name: main
    functions: [main, Derived1.virtualMethod, Derived2.virtualMethod]
"#
}

/// A unit whose only entry point is exported, so its parameter is unknown
pub fn exported_entry() -> &'static str {
    r#"
classes:
  - name: Shape
    kind: abstract
    methods:
      - name: area
  - name: Circle
    base: Shape
    methods:
      - name: area
        function: Circle.area
functions:
  - name: Circle.area
    owner: Circle
  - name: measure
    exported: true
    params: [shape]
    body:
      - kind: return
        value:
          kind: virtual_call
          receiver: { kind: local, name: shape }
          method: area
          declaring: Shape
units:
  - name: lib
    functions: [measure, Circle.area]
"#
}
