use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::JfrReader;

/// A type declared by a chunk's metadata section.
///
/// Classes without a `superType` attribute are the top-level types which can
/// own a constant pool section; event and annotation types carry one.
#[derive(Debug)]
pub struct JfrClass {
    pub id: u32,
    /// Fully qualified name, e.g. `jdk.types.StackTrace`.
    pub name: String,
    /// The portion of `name` after the last `.`.
    pub simple_name: String,
    pub super_type: Option<String>,
    /// Fields in declaration order. Order matters: the generic constant pool
    /// reader decodes one value per field in this exact sequence.
    pub fields: Vec<JfrField>,
}

impl JfrClass {
    fn from_attributes(attributes: &HashMap<&str, &str>) -> Result<Self, Error> {
        let id = attributes
            .get("id")
            .ok_or(Error::InvalidFormat("class element without id"))?
            .parse()
            .map_err(|_| Error::InvalidFormat("class element with malformed id"))?;
        let name = attributes
            .get("name")
            .ok_or(Error::InvalidFormat("class element without name"))?
            .to_string();
        let simple_name = match name.rfind('.') {
            Some(dot) => name[dot + 1..].to_string(),
            None => name.clone(),
        };
        Ok(JfrClass {
            id,
            name,
            simple_name,
            super_type: attributes.get("superType").map(|s| s.to_string()),
            fields: Vec::new(),
        })
    }

    /// Looks up a field by name, in declaration order.
    pub fn field(&self, name: &str) -> Option<&JfrField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A field declared by a `class` metadata element.
#[derive(Debug)]
pub struct JfrField {
    pub name: String,
    /// Type id of the field's type (wire attribute `class`).
    pub type_id: u32,
    /// True if the value on the wire is a 64-bit reference into a constant
    /// pool rather than an inline value.
    pub constant_pool: bool,
}

impl JfrField {
    fn from_attributes(attributes: &HashMap<&str, &str>) -> Result<Self, Error> {
        let name = attributes
            .get("name")
            .ok_or(Error::InvalidFormat("field element without name"))?
            .to_string();
        let type_id = attributes
            .get("class")
            .ok_or(Error::InvalidFormat("field element without type"))?
            .parse()
            .map_err(|_| Error::InvalidFormat("field element with malformed type"))?;
        Ok(JfrField {
            name,
            type_id,
            constant_pool: attributes.get("constantPool") == Some(&"true"),
        })
    }
}

/// One node of the metadata element tree. Only `class` and `field` elements
/// carry meaning for this reader; everything else is an opaque container
/// whose children are still traversed, since classes may nest anywhere.
/// Classes register themselves into the type registry as they complete, so
/// the variant carries no payload.
pub(crate) enum Element {
    Class,
    Field(JfrField),
    Other,
}

fn pool_str<'a>(strings: &'a [Option<String>], index: u32) -> Result<Option<&'a str>, Error> {
    strings
        .get(index as usize)
        .map(|s| s.as_deref())
        .ok_or(Error::InvalidFormat("string table index out of range"))
}

impl JfrReader {
    /// Decodes the metadata section the cursor is positioned at: the
    /// discarded record preamble, the per-chunk string pool, and the element
    /// tree which populates the type registry.
    pub(crate) fn read_metadata(&mut self) -> Result<(), Error> {
        self.cursor.read_varint()?; // record size
        self.cursor.read_varint()?; // record type
        self.cursor.read_varlong()?; // start time
        self.cursor.read_varlong()?; // duration
        self.cursor.read_varlong()?; // metadata id

        let count = self.cursor.read_varint()? as usize;
        let mut strings = Vec::with_capacity(count);
        for _ in 0..count {
            strings.push(self.cursor.read_string()?);
        }

        self.read_element(&strings)?;
        Ok(())
    }

    fn read_element(&mut self, strings: &[Option<String>]) -> Result<Element, Error> {
        let name_index = self.cursor.read_varint()?;
        let name = pool_str(strings, name_index)?;

        let attribute_count = self.cursor.read_varint()?;
        let mut attributes = HashMap::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            let key = pool_str(strings, self.cursor.read_varint()?)?;
            let value = pool_str(strings, self.cursor.read_varint()?)?;
            if let (Some(key), Some(value)) = (key, value) {
                attributes.insert(key, value);
            }
        }

        match name {
            Some("class") => {
                let mut class = JfrClass::from_attributes(&attributes)?;
                let child_count = self.cursor.read_varint()?;
                for _ in 0..child_count {
                    if let Element::Field(field) = self.read_element(strings)? {
                        class.fields.push(field);
                    }
                }
                let class = Rc::new(class);
                if class.super_type.is_none() {
                    self.types.put(u64::from(class.id), Rc::clone(&class));
                }
                self.types_by_name.insert(class.name.clone(), class);
                Ok(Element::Class)
            }
            Some("field") => {
                let field = JfrField::from_attributes(&attributes)?;
                let child_count = self.cursor.read_varint()?;
                for _ in 0..child_count {
                    self.read_element(strings)?; // annotations etc.
                }
                Ok(Element::Field(field))
            }
            _ => {
                let child_count = self.cursor.read_varint()?;
                for _ in 0..child_count {
                    self.read_element(strings)?;
                }
                Ok(Element::Other)
            }
        }
    }
}
