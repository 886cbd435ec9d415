// ── Record declarations ──
//
// `model_record!` declares an object-model record: a serde struct keyed by
// the controller's camelCase names, with an `extra` map for keys this
// crate does not model, plus its `Patch` impl.

macro_rules! model_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $key:literal => $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                #[serde(rename = $key)]
                pub $field: $ty,
            )*
            /// Keys without a typed field, kept by lenient merges.
            #[serde(flatten)]
            pub extra: std::collections::BTreeMap<String, serde_json::Value>,
        }

        impl $name {
            /// Apply one keyed field of a patch. Returns whether it changed.
            pub(crate) fn patch_field(
                &mut self,
                key: &str,
                item: &serde_json::Value,
                ctx: &mut $crate::model::patch::MergeContext,
            ) -> bool {
                match key {
                    $( $key => $crate::model::patch::Patch::patch(&mut self.$field, item, ctx), )*
                    _ => ctx.unknown_key(&mut self.extra, key, item),
                }
            }
        }

        impl $crate::model::patch::Patch for $name {
            fn patch(
                &mut self,
                value: &serde_json::Value,
                ctx: &mut $crate::model::patch::MergeContext,
            ) -> bool {
                if value.is_null() {
                    return $crate::model::patch::reset(self);
                }
                let Some(fields) = value.as_object() else {
                    ctx.type_mismatch("object");
                    return false;
                };
                let mut changed = false;
                for (key, item) in fields {
                    ctx.push(key);
                    changed |= self.patch_field(key, item, ctx);
                    ctx.pop();
                }
                changed
            }
        }
    };
}

/// Patch impls for plain string enums. Unknown names are type mismatches.
macro_rules! patch_enum {
    ($($ty:ty),* $(,)?) => {
        $crate::model::patch::patch_scalar! { $($ty => "known variant name"),* }
    };
}

pub(crate) use model_record;
pub(crate) use patch_enum;
