pub mod common;
pub mod edns;
pub mod enums;
pub mod header;
pub mod name;
pub mod question;
pub mod rdata;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWrite, BitWriter};
use common::PacketComponent;
use edns::EdnsOpt;
use enums::{DNSResourceType, ResponseCode};
use header::DNSHeader;
use question::DNSQuestion;
use resource::DNSResource;
use tracing::{debug, trace};

/// Size of the fixed message header
pub const HEADER_LEN: usize = 12;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
    /// EDNS0 OPT record if present (extracted from additional records)
    pub edns: Option<EdnsOpt>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid DNS header")]
    InvalidHeader,
    #[error("invalid DNS label")]
    InvalidLabel,
    #[error("invalid additional section")]
    InvalidAdditionalSection,
    #[error("invalid {0} rdata")]
    InvalidRdata(DNSResourceType),
    #[error("invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl DNSPacket {
    /// Build a recursive query for `qname`/`qtype`.
    pub fn query(id: u16, qname: &str, qtype: DNSResourceType) -> Self {
        let mut packet = DNSPacket::default();
        packet.header.id = id;
        packet.header.rd = true;
        packet.header.qdcount = 1;
        packet.questions.push(DNSQuestion::new(qname, qtype));
        packet
    }

    pub fn rcode(&self) -> ResponseCode {
        ResponseCode::from_u8(self.header.rcode)
    }

    /// Add or replace the OPT record.
    pub fn add_edns(&mut self, payload_size: u16, do_flag: bool) {
        let mut edns = EdnsOpt::with_payload_size(payload_size);
        edns.set_do_flag(do_flag);
        self.edns = Some(edns);
    }

    /// Check if DNSSEC records were requested (DO flag)
    pub fn dnssec_requested(&self) -> bool {
        self.edns.as_ref().map(|edns| edns.do_flag()).unwrap_or(false)
    }

    /// Answer records, or the authority section when the answer is empty.
    pub fn records_of_interest(&self) -> &[DNSResource] {
        if self.answers.is_empty() {
            &self.authorities
        } else {
            &self.answers
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        if buf.len() < HEADER_LEN {
            return Err(ParseError::InvalidHeader);
        }

        let mut reader = BitReader::<_, BigEndian>::new(buf);
        let mut packet = DNSPacket::default();
        packet.header.read(&mut reader, buf)?;
        debug!(
            "Parsed DNS header: id={}, qr={}, rcode={}, counts={}/{}/{}/{}",
            packet.header.id,
            packet.header.qr,
            packet.header.rcode,
            packet.header.qdcount,
            packet.header.ancount,
            packet.header.nscount,
            packet.header.arcount
        );

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader, buf)?;
            packet.questions.push(question);
        }

        for _ in 0..packet.header.ancount {
            let mut answer = DNSResource::default();
            answer.read(&mut reader, buf)?;
            packet.answers.push(answer);
        }

        for _ in 0..packet.header.nscount {
            let mut authority = DNSResource::default();
            authority.read(&mut reader, buf)?;
            packet.authorities.push(authority);
        }

        for _ in 0..packet.header.arcount {
            let mut resource = DNSResource::default();
            resource.read(&mut reader, buf)?;

            if resource.rtype == DNSResourceType::OPT && resource.labels.is_empty() {
                let edns = EdnsOpt::parse_from_resource(
                    resource.rclass.into(),
                    resource.ttl,
                    &resource.rdata,
                )?;
                trace!("Parsed {}", edns);
                packet.edns = Some(edns);
                continue;
            }

            packet.resources.push(resource);
        }

        Ok(packet)
    }

    /// Serialize without name compression. Section counts are derived from
    /// the section contents, not taken from the header.
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.resources.len() as u16 + self.edns.is_some() as u16;
        header.write(&mut writer)?;

        for question in &self.questions {
            question.write(&mut writer)?;
        }
        for record in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.resources.iter())
        {
            record.write(&mut writer)?;
        }

        if let Some(edns) = &self.edns {
            let (class, ttl, rdata) = edns.to_resource_format();
            // root owner
            writer.write_var::<u8>(8, 0)?;
            writer.write_var::<u16>(16, DNSResourceType::OPT.into())?;
            writer.write_var::<u16>(16, class)?;
            writer.write_var::<u32>(32, ttl)?;
            writer.write_var::<u16>(16, rdata.len() as u16)?;
            writer.write_bytes(&rdata)?;
        }

        Ok(buf)
    }
}
