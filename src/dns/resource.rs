use std::fmt;

use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::PacketComponent,
    enums::{DNSResourceClass, DNSResourceType},
    name, rdata,
};

/// A resource record with its RDATA held as raw, decompressed bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdlength: u16,
    pub rdata: Vec<u8>,
}

impl DNSResource {
    pub fn new(
        owner: &str,
        rtype: DNSResourceType,
        ttl: u32,
        rdata: Vec<u8>,
    ) -> Self {
        Self {
            labels: name::to_labels(owner),
            rtype,
            rclass: DNSResourceClass::IN,
            ttl,
            rdlength: rdata.len() as u16,
            rdata,
        }
    }

    /// Absolute lower-cased owner name
    pub fn name(&self) -> String {
        name::from_labels(&self.labels)
    }

    /// RDATA with embedded names lower-cased
    pub fn canonical_rdata(&self) -> Vec<u8> {
        rdata::canonicalize(self.rtype, &self.rdata)
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        if self.rdata.len() > u16::MAX as usize {
            return Err(ParseError::InvalidRdata(self.rtype));
        }
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, self.rdata.len() as u16)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        self.labels = self.read_labels(reader, packet_buf)?;
        self.rtype = reader.read_var::<u16>(16)?.into();
        self.rclass = reader.read_var::<u16>(16)?.into();
        self.ttl = reader.read_var::<u32>(32)?;
        self.rdlength = reader.read_var::<u16>(16)?;
        let mut buf = vec![0_u8; self.rdlength as usize];
        reader.read_bytes(&mut buf)?;
        self.rdata = rdata::decompress(self.rtype, &buf, packet_buf)?;
        self.rdlength = self.rdata.len() as u16;

        Ok(())
    }
}

impl fmt::Display for DNSResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} \\# {} {}",
            self.name(),
            self.ttl,
            self.rclass,
            self.rtype,
            self.rdata.len(),
            hex::encode(&self.rdata)
        )
    }
}
