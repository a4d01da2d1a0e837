//! The schema registry: the set of recorded schema versions, the resolved
//! runtime form of each, cross-version compatibility enforcement, and
//! storage-id assignment.

use super::{Field, ReferenceSpec, SchemaModel, SubField};
use crate::cnf::MAX_STORAGE_ID;
use crate::enc::registry::EncodingRegistry;
use crate::enc::FieldCodec;
use crate::err::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// What a storage-id names within one schema version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SidRole {
	Type,
	Simple,
	Counter,
	Set,
	List,
	Map,
	SetElem,
	ListElem,
	MapKey,
	MapValue,
	Composite,
}

/// Where a storage-id sits within one schema version. For a sub-field the
/// `field` is the containing complex field; for a top-level field it is the
/// storage-id itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SidLocation {
	pub type_id: u32,
	pub field: u32,
	pub role: SidRole,
}

/// The resolved runtime form of a simple field or sub-field: its codec plus
/// its index and reference settings.
#[derive(Clone, Debug)]
pub struct SimpleSchema {
	pub storage_id: u32,
	pub encoding: String,
	pub codec: FieldCodec,
	pub indexed: bool,
	pub reference: Option<ReferenceSpec>,
}

impl SimpleSchema {
	/// Whether index entries are maintained for this field. Reference
	/// fields are always indexed so that referrers can be found.
	pub fn maintained(&self) -> bool {
		self.indexed || self.reference.is_some()
	}

	fn resolve(
		storage_id: u32,
		encoding: &str,
		indexed: bool,
		reference: Option<&ReferenceSpec>,
		encodings: &EncodingRegistry,
	) -> Result<Self, Error> {
		if reference.is_some() && encoding != "reference" {
			return Err(Error::InvalidSchema(format!(
				"reference field {storage_id} must use the 'reference' encoding"
			)));
		}
		Ok(Self {
			storage_id,
			encoding: encoding.to_string(),
			codec: encodings.lookup(encoding)?,
			indexed,
			reference: reference.cloned(),
		})
	}
}

/// The resolved kind of one field.
#[derive(Clone, Debug)]
pub enum FieldKindSchema {
	Simple(SimpleSchema),
	Counter,
	Set {
		elem: SimpleSchema,
	},
	List {
		elem: SimpleSchema,
	},
	Map {
		key: SimpleSchema,
		value: SimpleSchema,
	},
}

/// One resolved field of an object type.
#[derive(Clone, Debug)]
pub struct FieldSchema {
	pub name: String,
	pub storage_id: u32,
	pub kind: FieldKindSchema,
}

/// One resolved composite index of an object type.
#[derive(Clone, Debug)]
pub struct CompositeSchema {
	pub name: String,
	pub storage_id: u32,
	pub fields: Vec<u32>,
}

/// One resolved object type.
#[derive(Clone, Debug)]
pub struct TypeSchema {
	pub name: String,
	pub storage_id: u32,
	pub fields: BTreeMap<u32, FieldSchema>,
	pub composites: BTreeMap<u32, CompositeSchema>,
	/// For each simple field, the composite indexes it participates in
	pub field_composites: BTreeMap<u32, Vec<u32>>,
}

impl TypeSchema {
	/// Every reference-valued simple field or sub-field of this type,
	/// with its location.
	pub fn references(&self) -> Vec<(SidLocation, &SimpleSchema)> {
		let mut out = Vec::new();
		for field in self.fields.values() {
			let loc = |role| SidLocation {
				type_id: self.storage_id,
				field: field.storage_id,
				role,
			};
			match &field.kind {
				FieldKindSchema::Simple(s) if s.reference.is_some() => {
					out.push((loc(SidRole::Simple), s));
				}
				FieldKindSchema::Set {
					elem,
				} if elem.reference.is_some() => {
					out.push((loc(SidRole::SetElem), elem));
				}
				FieldKindSchema::List {
					elem,
				} if elem.reference.is_some() => {
					out.push((loc(SidRole::ListElem), elem));
				}
				FieldKindSchema::Map {
					key,
					value,
				} => {
					if key.reference.is_some() {
						out.push((loc(SidRole::MapKey), key));
					}
					if value.reference.is_some() {
						out.push((loc(SidRole::MapValue), value));
					}
				}
				_ => (),
			}
		}
		out
	}
}

/// The compatibility signature of one storage-id: its kind, and the
/// encodings feeding any index entries written under it. Two schema versions
/// may share a storage-id only when their signatures are equal.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ItemSig {
	Type,
	Simple(String),
	Counter,
	Set,
	List,
	Map,
	SetElem(String),
	ListElem(String),
	MapKey(String),
	MapValue {
		key: String,
		value: String,
	},
	Composite(Vec<String>),
}

/// One resolved, recorded schema version.
#[derive(Clone, Debug)]
pub struct Schema {
	pub version: u32,
	pub model: SchemaModel,
	pub canonical: Vec<u8>,
	pub types: BTreeMap<u32, TypeSchema>,
	locations: BTreeMap<u32, SidLocation>,
	signatures: BTreeMap<u32, ItemSig>,
}

impl Schema {
	/// Resolve a normalised, fully id-assigned model against the encoding
	/// registry, validating every constraint a recorded schema must hold.
	fn resolve(version: u32, model: SchemaModel, encodings: &EncodingRegistry) -> Result<Self, Error> {
		let canonical = bincode::serialize(&model)
			.map_err(|e| Error::InvalidSchema(format!("unencodable schema model: {e}")))?;
		let mut types = BTreeMap::new();
		let mut locations = BTreeMap::new();
		let mut signatures = BTreeMap::new();
		let mut claim = |sid: u32,
		                 loc: SidLocation,
		                 sig: ItemSig,
		                 locations: &mut BTreeMap<u32, SidLocation>,
		                 signatures: &mut BTreeMap<u32, ItemSig>|
		 -> Result<(), Error> {
			if sid == 0 || sid > MAX_STORAGE_ID {
				return Err(Error::InvalidSchema(format!("storage-id {sid} out of range")));
			}
			if locations.insert(sid, loc).is_some() {
				return Err(Error::InvalidSchema(format!("duplicate storage-id {sid}")));
			}
			signatures.insert(sid, sig);
			Ok(())
		};
		for t in &model.object_types {
			if t.name.is_empty() {
				return Err(Error::InvalidSchema("empty object type name".to_string()));
			}
			let type_id = t.storage_id;
			claim(
				type_id,
				SidLocation {
					type_id,
					field: 0,
					role: SidRole::Type,
				},
				ItemSig::Type,
				&mut locations,
				&mut signatures,
			)?;
			let mut fields = BTreeMap::new();
			for f in &t.fields {
				if f.name().is_empty() {
					return Err(Error::InvalidSchema(format!(
						"empty field name in type '{}'",
						t.name
					)));
				}
				let fid = f.storage_id();
				let loc = |field, role| SidLocation {
					type_id,
					field,
					role,
				};
				let resolved = match f {
					Field::Simple {
						name,
						storage_id,
						encoding,
						indexed,
						reference,
					} => {
						let simple = SimpleSchema::resolve(
							*storage_id,
							encoding,
							*indexed,
							reference.as_ref(),
							encodings,
						)?;
						claim(
							fid,
							loc(fid, SidRole::Simple),
							ItemSig::Simple(encoding.clone()),
							&mut locations,
							&mut signatures,
						)?;
						FieldSchema {
							name: name.clone(),
							storage_id: fid,
							kind: FieldKindSchema::Simple(simple),
						}
					}
					Field::Counter {
						name,
						storage_id,
					} => {
						claim(
							*storage_id,
							loc(fid, SidRole::Counter),
							ItemSig::Counter,
							&mut locations,
							&mut signatures,
						)?;
						FieldSchema {
							name: name.clone(),
							storage_id: fid,
							kind: FieldKindSchema::Counter,
						}
					}
					Field::Set {
						name,
						storage_id,
						element,
					} => {
						claim(
							*storage_id,
							loc(fid, SidRole::Set),
							ItemSig::Set,
							&mut locations,
							&mut signatures,
						)?;
						let elem = Self::resolve_sub(element, encodings)?;
						claim(
							element.storage_id,
							loc(fid, SidRole::SetElem),
							ItemSig::SetElem(element.encoding.clone()),
							&mut locations,
							&mut signatures,
						)?;
						FieldSchema {
							name: name.clone(),
							storage_id: fid,
							kind: FieldKindSchema::Set {
								elem,
							},
						}
					}
					Field::List {
						name,
						storage_id,
						element,
					} => {
						claim(
							*storage_id,
							loc(fid, SidRole::List),
							ItemSig::List,
							&mut locations,
							&mut signatures,
						)?;
						let elem = Self::resolve_sub(element, encodings)?;
						claim(
							element.storage_id,
							loc(fid, SidRole::ListElem),
							ItemSig::ListElem(element.encoding.clone()),
							&mut locations,
							&mut signatures,
						)?;
						FieldSchema {
							name: name.clone(),
							storage_id: fid,
							kind: FieldKindSchema::List {
								elem,
							},
						}
					}
					Field::Map {
						name,
						storage_id,
						key,
						value,
					} => {
						claim(
							*storage_id,
							loc(fid, SidRole::Map),
							ItemSig::Map,
							&mut locations,
							&mut signatures,
						)?;
						let key_schema = Self::resolve_sub(key, encodings)?;
						let value_schema = Self::resolve_sub(value, encodings)?;
						claim(
							key.storage_id,
							loc(fid, SidRole::MapKey),
							ItemSig::MapKey(key.encoding.clone()),
							&mut locations,
							&mut signatures,
						)?;
						claim(
							value.storage_id,
							loc(fid, SidRole::MapValue),
							ItemSig::MapValue {
								key: key.encoding.clone(),
								value: value.encoding.clone(),
							},
							&mut locations,
							&mut signatures,
						)?;
						FieldSchema {
							name: name.clone(),
							storage_id: fid,
							kind: FieldKindSchema::Map {
								key: key_schema,
								value: value_schema,
							},
						}
					}
				};
				if fields.insert(fid, resolved).is_some() {
					return Err(Error::InvalidSchema(format!("duplicate field storage-id {fid}")));
				}
			}
			// Resolve the composite indexes against the type's simple fields
			let mut composites = BTreeMap::new();
			let mut field_composites: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
			for c in &t.composites {
				if c.fields.is_empty() {
					return Err(Error::InvalidSchema(format!(
						"composite index '{}' has no fields",
						c.name
					)));
				}
				let mut component_encodings = Vec::with_capacity(c.fields.len());
				for fid in &c.fields {
					match fields.get(fid).map(|f| &f.kind) {
						Some(FieldKindSchema::Simple(s)) => {
							component_encodings.push(s.encoding.clone());
						}
						_ => {
							return Err(Error::InvalidSchema(format!(
								"composite index '{}' names non-simple field {fid}",
								c.name
							)));
						}
					}
					field_composites.entry(*fid).or_default().push(c.storage_id);
				}
				claim(
					c.storage_id,
					SidLocation {
						type_id,
						field: c.storage_id,
						role: SidRole::Composite,
					},
					ItemSig::Composite(component_encodings),
					&mut locations,
					&mut signatures,
				)?;
				composites.insert(
					c.storage_id,
					CompositeSchema {
						name: c.name.clone(),
						storage_id: c.storage_id,
						fields: c.fields.clone(),
					},
				);
			}
			let schema = TypeSchema {
				name: t.name.clone(),
				storage_id: type_id,
				fields,
				composites,
				field_composites,
			};
			if types.insert(type_id, schema).is_some() {
				return Err(Error::InvalidSchema(format!("duplicate type storage-id {type_id}")));
			}
		}
		Ok(Self {
			version,
			model,
			canonical,
			types,
			locations,
			signatures,
		})
	}

	fn resolve_sub(sub: &SubField, encodings: &EncodingRegistry) -> Result<SimpleSchema, Error> {
		SimpleSchema::resolve(
			sub.storage_id,
			&sub.encoding,
			sub.indexed,
			sub.reference.as_ref(),
			encodings,
		)
	}

	/// Resolve an object-type storage-id within this version.
	pub fn type_schema(&self, type_id: u32) -> Result<&TypeSchema, Error> {
		self.types.get(&type_id).ok_or(Error::UnknownType(type_id))
	}

	/// Resolve a top-level field storage-id within a type of this version.
	pub fn field(&self, type_id: u32, field: u32) -> Result<&FieldSchema, Error> {
		self.type_schema(type_id)?.fields.get(&field).ok_or(Error::UnknownField {
			type_id,
			field,
		})
	}

	/// Where a storage-id sits within this version, if anywhere.
	pub fn locate(&self, sid: u32) -> Option<&SidLocation> {
		self.locations.get(&sid)
	}

	/// Resolve a reference-valued simple field or sub-field storage-id.
	pub fn reference_at(&self, sid: u32) -> Option<(SidLocation, &SimpleSchema)> {
		let loc = *self.locations.get(&sid)?;
		let field = self.types.get(&loc.type_id)?.fields.get(&loc.field)?;
		let simple = match (&field.kind, loc.role) {
			(FieldKindSchema::Simple(s), SidRole::Simple) => s,
			(
				FieldKindSchema::Set {
					elem,
				},
				SidRole::SetElem,
			) => elem,
			(
				FieldKindSchema::List {
					elem,
				},
				SidRole::ListElem,
			) => elem,
			(
				FieldKindSchema::Map {
					key,
					..
				},
				SidRole::MapKey,
			) => key,
			(
				FieldKindSchema::Map {
					value,
					..
				},
				SidRole::MapValue,
			) => value,
			_ => return None,
		};
		simple.reference.as_ref()?;
		Some((loc, simple))
	}
}

/// The information needed to open an index view over a storage-id: the value
/// codec plus the discriminator codec for list-position and map-value
/// entries.
#[derive(Clone, Debug)]
pub struct IndexInfo {
	pub field: u32,
	pub codec: FieldCodec,
	pub disc: Option<FieldCodec>,
}

/// The set of recorded schema versions. One registry is shared read-mostly
/// between all transactions of a datastore.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
	encodings: EncodingRegistry,
	versions: BTreeMap<u32, Arc<Schema>>,
}

impl SchemaRegistry {
	/// Create a registry using the given encoding catalog.
	pub fn new(encodings: EncodingRegistry) -> Self {
		Self {
			encodings,
			versions: BTreeMap::new(),
		}
	}

	/// The encoding catalog in use.
	pub fn encodings(&self) -> &EncodingRegistry {
		&self.encodings
	}

	/// The recorded version numbers, ascending.
	pub fn versions(&self) -> Vec<u32> {
		self.versions.keys().copied().collect()
	}

	/// The newest recorded version, if any.
	pub fn newest(&self) -> Option<Arc<Schema>> {
		self.versions.values().next_back().cloned()
	}

	/// Resolve a recorded version.
	pub fn get(&self, version: u32) -> Option<Arc<Schema>> {
		self.versions.get(&version).cloned()
	}

	/// Find a recorded version whose canonical form matches the given bytes.
	pub fn find_canonical(&self, canonical: &[u8]) -> Option<Arc<Schema>> {
		self.versions.values().find(|s| s.canonical == canonical).cloned()
	}

	/// Find the recorded version matching a model, without recording
	/// anything. Unassigned storage-ids are filled in the same way
	/// [`record`] would fill them, so a model matches regardless of whether
	/// its identifiers were explicit.
	///
	/// [`record`]: SchemaRegistry::record
	pub fn locate(&self, model: &SchemaModel) -> Result<Option<Arc<Schema>>, Error> {
		let mut model = model.clone();
		self.assign_storage_ids(&mut model)?;
		model.normalise();
		let canonical = bincode::serialize(&model)
			.map_err(|e| Error::InvalidSchema(format!("unencodable schema model: {e}")))?;
		Ok(self.find_canonical(&canonical))
	}

	/// Record a schema model. Unassigned storage-ids are filled in with
	/// fresh identifiers. When a recorded version already carries the same
	/// canonical form it is returned unchanged; otherwise the model is
	/// resolved, checked for compatibility against every recorded version,
	/// and recorded under the requested version number (or the next free
	/// number).
	pub fn record(&mut self, mut model: SchemaModel, version: Option<u32>) -> Result<Arc<Schema>, Error> {
		self.assign_storage_ids(&mut model)?;
		model.normalise();
		let canonical = bincode::serialize(&model)
			.map_err(|e| Error::InvalidSchema(format!("unencodable schema model: {e}")))?;
		if let Some(existing) = self.find_canonical(&canonical) {
			match version {
				Some(v) if v != existing.version => {
					return Err(Error::SchemaMismatch(format!(
						"schema is already recorded as version {}",
						existing.version
					)));
				}
				_ => return Ok(existing),
			}
		}
		let version = match version {
			Some(v) if v == 0 => {
				return Err(Error::InvalidSchema("schema version must be positive".to_string()));
			}
			Some(v) => {
				if self.versions.contains_key(&v) {
					return Err(Error::SchemaMismatch(format!(
						"version {v} is already recorded with a different schema"
					)));
				}
				v
			}
			None => self.versions.keys().next_back().copied().unwrap_or(0) + 1,
		};
		let schema = Arc::new(Schema::resolve(version, model, &self.encodings)?);
		self.check_compatible(&schema)?;
		self.versions.insert(version, schema.clone());
		debug!(target: "shale::core::catalog", version, "Recorded a new schema version");
		Ok(schema)
	}

	/// Re-resolve a schema read back from its recorded canonical form.
	pub fn add_recorded(&mut self, version: u32, canonical: &[u8]) -> Result<Arc<Schema>, Error> {
		if let Some(existing) = self.versions.get(&version) {
			if existing.canonical != canonical {
				return Err(Error::InconsistentDatabase(format!(
					"recorded schema version {version} does not match the registry"
				)));
			}
			return Ok(existing.clone());
		}
		let model: SchemaModel = bincode::deserialize(canonical).map_err(|e| {
			Error::InconsistentDatabase(format!("undecodable schema record {version}: {e}"))
		})?;
		let schema = Arc::new(Schema::resolve(version, model, &self.encodings)?);
		self.check_compatible(&schema)?;
		self.versions.insert(version, schema.clone());
		Ok(schema)
	}

	/// Forget a recorded version. The caller is responsible for verifying
	/// that no objects remain at this version.
	pub fn remove(&mut self, version: u32) -> Option<Arc<Schema>> {
		self.versions.remove(&version)
	}

	/// Every object-type storage-id known to any recorded version. This set
	/// is the default whitelist of reference targets.
	pub fn object_type_ids(&self) -> BTreeSet<u32> {
		self.versions.values().flat_map(|s| s.types.keys().copied()).collect()
	}

	/// The index view information for a storage-id which is indexed in at
	/// least one recorded version.
	pub fn index_info(&self, sid: u32) -> Result<IndexInfo, Error> {
		for schema in self.versions.values() {
			let Some(loc) = schema.locate(sid) else {
				continue;
			};
			let Ok(t) = schema.type_schema(loc.type_id) else {
				continue;
			};
			let Some(field) = t.fields.get(&loc.field) else {
				continue;
			};
			let info = match (&field.kind, loc.role) {
				(FieldKindSchema::Simple(s), SidRole::Simple) if s.indexed => IndexInfo {
					field: sid,
					codec: s.codec.clone(),
					disc: None,
				},
				(
					FieldKindSchema::Set {
						elem,
					},
					SidRole::SetElem,
				) if elem.indexed => IndexInfo {
					field: sid,
					codec: elem.codec.clone(),
					disc: None,
				},
				(
					FieldKindSchema::List {
						elem,
					},
					SidRole::ListElem,
				) if elem.indexed => IndexInfo {
					field: sid,
					codec: elem.codec.clone(),
					disc: Some(FieldCodec::UInt64),
				},
				(
					FieldKindSchema::Map {
						key,
						..
					},
					SidRole::MapKey,
				) if key.indexed => IndexInfo {
					field: sid,
					codec: key.codec.clone(),
					disc: None,
				},
				(
					FieldKindSchema::Map {
						key,
						value,
					},
					SidRole::MapValue,
				) if value.indexed => IndexInfo {
					field: sid,
					codec: value.codec.clone(),
					disc: Some(key.codec.clone()),
				},
				_ => continue,
			};
			return Ok(info);
		}
		Err(Error::UnknownIndex(sid))
	}

	/// The reference index information for a storage-id which holds
	/// references in at least one recorded version, indexed or not.
	/// Reference fields always maintain index entries so that referrers can
	/// be found.
	pub fn reference_info(&self, sid: u32) -> Option<IndexInfo> {
		for schema in self.versions.values() {
			if let Some((loc, _)) = schema.reference_at(sid) {
				let disc = match loc.role {
					SidRole::ListElem => Some(FieldCodec::UInt64),
					SidRole::MapValue => {
						let t = schema.types.get(&loc.type_id)?;
						match &t.fields.get(&loc.field)?.kind {
							FieldKindSchema::Map {
								key,
								..
							} => Some(key.codec.clone()),
							_ => None,
						}
					}
					_ => None,
				};
				return Some(IndexInfo {
					field: sid,
					codec: FieldCodec::Reference,
					disc,
				});
			}
		}
		None
	}

	/// Every reference-valued storage-id known to any recorded version.
	pub fn all_reference_sids(&self) -> BTreeSet<u32> {
		let mut out = BTreeSet::new();
		for schema in self.versions.values() {
			for t in schema.types.values() {
				for (_, simple) in t.references() {
					out.insert(simple.storage_id);
				}
			}
		}
		out
	}

	/// The component codecs of a composite index known to any recorded
	/// version.
	pub fn composite_info(&self, cid: u32) -> Result<Vec<FieldCodec>, Error> {
		for schema in self.versions.values() {
			let Some(loc) = schema.locate(cid) else {
				continue;
			};
			if loc.role != SidRole::Composite {
				continue;
			}
			let Ok(t) = schema.type_schema(loc.type_id) else {
				continue;
			};
			let Some(comp) = t.composites.get(&cid) else {
				continue;
			};
			let mut codecs = Vec::with_capacity(comp.fields.len());
			for fid in &comp.fields {
				match t.fields.get(fid).map(|f| &f.kind) {
					Some(FieldKindSchema::Simple(s)) => codecs.push(s.codec.clone()),
					_ => {
						return Err(Error::InconsistentDatabase(format!(
							"composite index {cid} names unknown field {fid}"
						)));
					}
				}
			}
			return Ok(codecs);
		}
		Err(Error::UnknownIndex(cid))
	}

	/// Verify a new schema's storage-ids against every recorded version:
	/// shared identifiers must keep their kind and their index-relevant
	/// encodings.
	fn check_compatible(&self, new: &Schema) -> Result<(), Error> {
		for schema in self.versions.values() {
			for (sid, sig) in &new.signatures {
				if let Some(existing) = schema.signatures.get(sid) {
					if existing != sig {
						return Err(Error::InvalidSchema(format!(
							"storage-id {sid} is incompatible with schema version {}",
							schema.version
						)));
					}
				}
			}
		}
		Ok(())
	}

	/// Fill in any zero storage-ids with fresh identifiers unused by this
	/// model and by every recorded version.
	fn assign_storage_ids(&self, model: &mut SchemaModel) -> Result<(), Error> {
		let mut used: BTreeSet<u32> = self
			.versions
			.values()
			.flat_map(|s| s.locations.keys().copied())
			.collect();
		for t in &model.object_types {
			let mut collect = |sid: u32| {
				if sid != 0 {
					used.insert(sid);
				}
			};
			collect(t.storage_id);
			for f in &t.fields {
				collect(f.storage_id());
				match f {
					Field::Set {
						element,
						..
					}
					| Field::List {
						element,
						..
					} => collect(element.storage_id),
					Field::Map {
						key,
						value,
						..
					} => {
						collect(key.storage_id);
						collect(value.storage_id);
					}
					_ => (),
				}
			}
			for c in &t.composites {
				collect(c.storage_id);
			}
		}
		let mut next = used.iter().next_back().copied().unwrap_or(0);
		let mut fresh = || -> Result<u32, Error> {
			next += 1;
			if next > MAX_STORAGE_ID {
				return Err(Error::InvalidSchema("storage-id space exhausted".to_string()));
			}
			Ok(next)
		};
		for t in &mut model.object_types {
			if t.storage_id == 0 {
				t.storage_id = fresh()?;
			}
			for f in &mut t.fields {
				let assign_sub = |sub: &mut SubField, fresh: &mut dyn FnMut() -> Result<u32, Error>| {
					if sub.storage_id == 0 {
						sub.storage_id = fresh()?;
					}
					Ok::<(), Error>(())
				};
				match f {
					Field::Simple {
						storage_id,
						..
					}
					| Field::Counter {
						storage_id,
						..
					} => {
						if *storage_id == 0 {
							*storage_id = fresh()?;
						}
					}
					Field::Set {
						storage_id,
						element,
						..
					}
					| Field::List {
						storage_id,
						element,
						..
					} => {
						if *storage_id == 0 {
							*storage_id = fresh()?;
						}
						assign_sub(element, &mut fresh)?;
					}
					Field::Map {
						storage_id,
						key,
						value,
						..
					} => {
						if *storage_id == 0 {
							*storage_id = fresh()?;
						}
						assign_sub(key, &mut fresh)?;
						assign_sub(value, &mut fresh)?;
					}
				}
			}
			for c in &mut t.composites {
				if c.storage_id == 0 {
					c.storage_id = fresh()?;
				}
			}
		}
		Ok(())
	}
}
